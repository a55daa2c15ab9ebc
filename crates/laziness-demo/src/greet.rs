//! The greeting graph.
//!
//! Reads like straight-line code, but only builds lazy values: nothing runs
//! until the returned value is awaited, and then only the greeting matching
//! the time of day is printed.

use laziness::{func, lazy_if, LazyValue, Lifted, Value};

use crate::exec::Output;

/// Options for building the greeting.
#[derive(Debug, Clone)]
pub struct GreetOptions {
    /// Hours strictly after this one count as evening.
    pub evening_after: u32,
    /// Name to greet; asked from `whoami` when absent.
    pub name: Option<String>,
}

impl GreetOptions {
    pub fn new() -> Self {
        Self {
            evening_after: 14,
            name: None,
        }
    }

    pub fn evening_after(mut self, hour: u32) -> Self {
        self.evening_after = hour;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Default for GreetOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the lazy greeting, running commands through `exec`.
///
/// Settles with the line that was printed.
pub fn greet(exec: &Lifted<String, Output>, options: &GreetOptions) -> LazyValue<String> {
    // First line of a command's stdout, without the newline.
    let first_line = func(|outputs: Vec<Output>| {
        Ok(outputs[0].stdout.lines().next().unwrap_or_default().to_string())
    });

    // Unparseable output is NaN, which is never past the threshold.
    let evening_after = f64::from(options.evening_after);
    let is_evening = func(move |outputs: Vec<Output>| {
        Ok(Value::from(outputs[0].stdout.as_str()).to_number() > evening_after)
    });

    let name = match &options.name {
        Some(name) => LazyValue::from_value(name.clone()),
        None => first_line.call([exec.call(["whoami"])]),
    };
    let evening = is_evening.call([exec.call(["date +%H"])]);

    lazy_if(
        evening,
        say("Good evening").call([&name]),
        say("Good morning").call([&name]),
    )
}

/// A lifted function printing `"<salutation>, <name>!"`.
fn say(salutation: &'static str) -> Lifted<String, String> {
    func(move |names: Vec<String>| {
        let line = format!("{}, {}!", salutation, names[0]);
        println!("{}", line);
        Ok(line)
    })
}
