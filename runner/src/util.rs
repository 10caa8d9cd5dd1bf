use once_cell::sync::Lazy;
use std::{
    os::unix::process::ExitStatusExt,
    process::{ExitCode, ExitStatus},
};
use tracing::warn;

/// name of the node we're running on, jobs land on arbitrary hosts of the allow-list
pub static HOSTNAME: Lazy<String> = Lazy::new(|| match nix::unistd::gethostname() {
    Ok(hostname) => hostname.to_string_lossy().into_owned(),
    Err(error) => {
        warn!(error = ?error, "Failed to retrieve hostname");
        String::from("unknown")
    }
});

/// exit code of a finished child, termination by signal maps to 128 + signal like in a shell
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

/// clamp an exit code into what a process can actually return
pub fn to_exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
