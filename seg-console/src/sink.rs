use seg_core::action::ReportSink;
use seg_core::notifier::NotifierHandle;

/// Prints what actions report. Errors and warnings go to stderr.
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn error(&self, message: &str) {
        log::error!(target: "console", "{}", message);
        eprintln!("error: {}", message);
    }

    fn warning(&self, message: &str) {
        log::warn!(target: "console", "{}", message);
        eprintln!("warning: {}", message);
    }

    fn message(&self, message: &str) {
        println!("{}", message);
    }

    fn need_resource(&self, notifier: &NotifierHandle) {
        eprintln!("busy: waiting on {}", notifier.name());
    }
}
