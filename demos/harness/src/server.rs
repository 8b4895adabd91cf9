//! Spawns and owns a `chatroom-server` child process for the duration of
//! a `Command::Start`/`Command::Crash` pair.

pub struct Server(std::process::Child);

impl Server {
    pub fn new(path: &std::path::Path, id: usize, base_port: u16, port: u16, count: usize, verbose: u8) -> Self {
        let mut command = std::process::Command::new(path);
        if verbose > 0 {
            command.arg(format!("-{}", "v".repeat(verbose as usize)));
        }
        command
            .args(["-i", &id.to_string()])
            .args(["-b", &base_port.to_string()])
            .args(["-p", &port.to_string()])
            .args(["-c", &count.to_string()])
            .spawn()
            .map(Server)
            .expect("failed to spawn chatroom-server")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.0.kill().ok();
    }
}
