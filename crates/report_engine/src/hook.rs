use report_models::ReportMetadata;

/// Called once per closed, non-discarded report, from a background task and
/// never while any engine lock is held. Deployments plug in an uploader or a
/// queue publisher here; failures must stay inside the hook.
pub trait CloseHook: Send + Sync {
    fn on_close(&self, meta: &ReportMetadata);
}

/// Default hook: does nothing.
pub struct NoopHook;

impl CloseHook for NoopHook {
    fn on_close(&self, _meta: &ReportMetadata) {}
}
