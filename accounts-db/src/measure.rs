//! A tiny stopwatch for timing maintenance-loop stages, logged rather than
//! fed to an external metrics registry (out of scope here).

use std::time::Instant;

pub struct Measure {
    name: &'static str,
    start: Instant,
    elapsed_ns: u64,
}

impl Measure {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
            elapsed_ns: 0,
        }
    }

    pub fn stop(&mut self) {
        self.elapsed_ns = self.start.elapsed().as_nanos() as u64;
    }

    pub fn as_ms(&self) -> u64 {
        self.elapsed_ns / 1_000_000
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Display for Measure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} took {}ms", self.name, self.as_ms())
    }
}
