/// An error that can suggest what the user should do about it.
pub trait DiagnosableError: std::error::Error {
    /// Hints printed after the error itself. None by default.
    fn diagnose(&self) -> Vec<String> {
        vec![]
    }
}
