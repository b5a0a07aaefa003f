//! Test logger. Forwards to `env_logger` and keeps each thread's records
//! so tests can assert on emitted warnings.

use std::cell::RefCell;
use std::sync::Once;

thread_local! {
    static RECORDS: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct CapturingLogger {
    inner: env_logger::Logger,
}

impl log::Log for CapturingLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()));
        });
        if self.inner.matches(record) {
            self.inner.log(record);
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the logger once per test binary.
pub(crate) fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let inner = env_logger::Builder::from_default_env().is_test(true).build();
        let logger: &'static CapturingLogger = Box::leak(Box::new(CapturingLogger { inner }));
        if log::set_logger(logger).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });
}

/// Drain the records logged on this thread so far.
pub(crate) fn take() -> Vec<(log::Level, String)> {
    RECORDS.with(|records| std::mem::take(&mut *records.borrow_mut()))
}
