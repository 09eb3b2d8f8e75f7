/// Session detachment, the one portability-sensitive primitive.
///
/// Both the child script and the daemonized supervisor are started through
/// here so they leave the caller's session and controlling terminal.
/// `process_group(0)` is not enough: a new group stays in the caller's session
/// and still receives the terminal's SIGHUP, so `setsid` runs in `pre_exec`.

/// Arrange for `cmd` to call `setsid(2)` in the forked child before exec.
pub fn new_session(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: `enter_new_session` only calls setsid, which is async-signal-safe.
    unsafe {
        cmd.pre_exec(enter_new_session);
    }
}

/// Same as [`new_session`] for tokio commands.
pub fn new_session_async(cmd: &mut tokio::process::Command) {
    // SAFETY: see `new_session`.
    unsafe {
        cmd.pre_exec(enter_new_session);
    }
}

fn enter_new_session() -> std::io::Result<()> {
    nix::unistd::setsid()
        .map(|_| ())
        .map_err(std::io::Error::from)
}
