use std::io::{self, BufRead, Write};
use tracing::debug;

/// Supplies the one-time code for an MFA device during role assumption
///
/// Implemented for any `Fn(&str) -> io::Result<String>`, which receives the
/// device serial number:
///
/// ```rust
/// use flow::session::SessionBuilder;
///
/// let builder = SessionBuilder::new()
///     .profile("admin")
///     .token_provider(|_serial: &str| -> std::io::Result<String> { Ok("123456".to_string()) });
/// ```
pub trait MfaTokenProvider: Send + Sync {
    /// Return the current code for the device identified by `mfa_serial`
    fn token_code(&self, mfa_serial: &str) -> io::Result<String>;
}

impl<F> MfaTokenProvider for F
where
    F: Fn(&str) -> io::Result<String> + Send + Sync,
{
    fn token_code(&self, mfa_serial: &str) -> io::Result<String> {
        self(mfa_serial)
    }
}

/// Prompts on stderr and reads the code from stdin
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinTokenProvider;

impl StdinTokenProvider {
    const PROMPT: &'static str = "Assume Role MFA token code: ";
}

impl MfaTokenProvider for StdinTokenProvider {
    fn token_code(&self, mfa_serial: &str) -> io::Result<String> {
        debug!(mfa_serial, "prompting for MFA token code");

        let mut stderr = io::stderr().lock();
        stderr.write_all(Self::PROMPT.as_bytes())?;
        stderr.flush()?;

        let mut code = String::new();
        if io::stdin().lock().read_line(&mut code)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no MFA token code on stdin",
            ));
        }

        Ok(code.trim().to_string())
    }
}
