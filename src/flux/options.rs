//! Query-level `option` declarations.

use chrono::{DateTime, TimeZone};

use crate::error::Result;
use crate::escape;
use crate::flux::property::{FluxDuration, Parameters, Property};
use crate::value::Value;

/// `option now = ...`, pinning the time the query considers "now".
#[derive(Clone, Debug, PartialEq)]
pub enum NowOption {
    /// `option now = () => 2020-01-01T00:00:00Z`
    Time(Value),
    /// `option now = <function>`, e.g. a function defined elsewhere.
    Function(String),
}

impl NowOption {
    /// Pin "now" to a fixed instant.
    pub fn time<Tz: TimeZone>(time: DateTime<Tz>) -> Self {
        NowOption::Time(Value::from(time))
    }

    /// Use a named function or expression as "now".
    pub fn function(expr: impl Into<String>) -> Self {
        NowOption::Function(expr.into())
    }
}

/// `option task = {...}` for scheduled tasks.
///
/// Only the fields that are set are written, in the order name, every,
/// delay, cron, retry.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskOption {
    name: String,
    every: Option<FluxDuration>,
    delay: Option<FluxDuration>,
    cron: Option<String>,
    retry: Option<i64>,
}

impl TaskOption {
    /// Task called `name` with no schedule yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            every: None,
            delay: None,
            cron: None,
            retry: None,
        }
    }

    /// Run interval.
    pub fn every(mut self, every: FluxDuration) -> Self {
        self.every = Some(every);
        self
    }

    /// Delay after each scheduled time.
    pub fn delay(mut self, delay: FluxDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cron schedule.
    pub fn cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = Some(cron.into());
        self
    }

    /// Retry count.
    pub fn retry(mut self, retry: i64) -> Self {
        self.retry = Some(retry);
        self
    }

    fn write(&self, buf: &mut String) {
        let mut entries: Vec<(&str, String)> = Vec::with_capacity(5);
        entries.push(("name", escape::escape_string_value(&self.name)));
        if let Some(every) = self.every {
            entries.push(("every", every.to_string()));
        }
        if let Some(delay) = self.delay {
            entries.push(("delay", delay.to_string()));
        }
        if let Some(cron) = &self.cron {
            entries.push(("cron", escape::escape_string_value(cron)));
        }
        if let Some(retry) = self.retry {
            entries.push(("retry", retry.to_string()));
        }

        buf.push_str("{\n\t");
        for (i, (key, value)) in entries.iter().enumerate() {
            if i > 0 {
                buf.push_str(",\n\t");
            }
            buf.push_str(key);
            buf.push_str(": ");
            buf.push_str(value);
        }
        buf.push_str("\n}");
    }
}

/// A top-level `option <name> = <value>` declaration.
#[derive(Clone, Debug, PartialEq)]
pub enum FluxOption {
    /// `option now = ...`
    Now(NowOption),
    /// `option task = {...}`
    Task(TaskOption),
    /// Any other option, e.g. `option location = ...`.
    Variable {
        /// Option name.
        name: String,
        /// Option value; may reference a parameter.
        value: Property,
    },
}

impl FluxOption {
    /// Generic option.
    pub fn variable(name: impl Into<String>, value: impl Into<Property>) -> Self {
        FluxOption::Variable {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Append `option <name> = <value>`.
    pub fn write(&self, buf: &mut String, params: &Parameters) -> Result<()> {
        match self {
            FluxOption::Now(now) => {
                buf.push_str("option now = ");
                match now {
                    NowOption::Time(t) => {
                        buf.push_str("() => ");
                        t.write_flux_literal(buf);
                    }
                    NowOption::Function(expr) => buf.push_str(expr),
                }
            }
            FluxOption::Task(task) => {
                buf.push_str("option task = ");
                task.write(buf);
            }
            FluxOption::Variable { name, value } => {
                buf.push_str("option ");
                buf.push_str(name);
                buf.push_str(" = ");
                if !value.write(buf, params)? {
                    buf.push_str("null");
                }
            }
        }
        Ok(())
    }
}

impl From<NowOption> for FluxOption {
    fn from(v: NowOption) -> Self {
        FluxOption::Now(v)
    }
}

impl From<TaskOption> for FluxOption {
    fn from(v: TaskOption) -> Self {
        FluxOption::Task(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn render(option: impl Into<FluxOption>) -> String {
        let mut s = String::new();
        option.into().write(&mut s, &Parameters::new()).unwrap();
        s
    }

    #[test]
    fn test_task_option_every_and_retry() {
        let task = TaskOption::new("foo").every(FluxDuration::hours(1)).retry(5);
        assert_eq!(
            render(task),
            "option task = {\n\tname: \"foo\",\n\tevery: 1h,\n\tretry: 5\n}"
        );
    }

    #[test]
    fn test_task_option_field_order() {
        let task = TaskOption::new("foo")
            .retry(3)
            .cron("0 2 * * *")
            .delay(FluxDuration::minutes(10))
            .every(FluxDuration::new(1, crate::flux::TimeUnit::HalfDays));
        assert_eq!(
            render(task),
            "option task = {\n\tname: \"foo\",\n\tevery: 12h,\n\tdelay: 10m,\n\tcron: \"0 2 * * *\",\n\tretry: 3\n}"
        );
    }

    #[test]
    fn test_now_option() {
        let t = DateTime::parse_from_rfc3339("2020-02-10T08:19:53Z").unwrap();
        assert_eq!(render(NowOption::time(t)), "option now = () => 2020-02-10T08:19:53Z");
        assert_eq!(render(NowOption::function("giveMeTime")), "option now = giveMeTime");
    }

    #[test]
    fn test_variable_option_parameter() {
        let option = FluxOption::variable("location", Property::parameter("loc"));
        let mut s = String::new();
        let err = option.write(&mut s, &Parameters::new()).unwrap_err();
        assert!(matches!(err, Error::UnboundParameter(_)));

        let mut s = String::new();
        option
            .write(&mut s, &Parameters::new().bind("loc", "Europe/Prague"))
            .unwrap();
        assert_eq!(s, "option location = \"Europe/Prague\"");
    }
}
