use std::path::PathBuf;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

use crate::env::base::EnvError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const DROP_GRACE: Duration = Duration::from_millis(2000);

/// Everything needed to start one game instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GameLaunch {
    pub executable: PathBuf,
    pub port: u16,
    pub speed: f32,
    pub headless: bool,
}

impl GameLaunch {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--rl-mode".to_string(),
            format!("--port={}", self.port),
            format!("--speed={}", self.speed),
        ];

        if self.headless {
            args.push("--headless".to_string());
        }

        args
    }
}

/// A running game process, reaped on shutdown or drop.
#[derive(Debug)]
pub struct GameProcess {
    child: Option<Child>,
    port: u16,
}

impl GameProcess {
    pub fn spawn(launch: &GameLaunch) -> Result<Self, EnvError> {
        if !launch.executable.exists() {
            return Err(EnvError::ExecutableNotFound(launch.executable.clone()));
        }

        let args = launch.args();
        tracing::debug!(executable = ?launch.executable, ?args, "spawning game");

        let child = Command::new(&launch.executable)
            .args(&args)
            .spawn()
            .map_err(EnvError::Spawn)?;

        tracing::info!(pid = child.id(), port = launch.port, "game process started");

        Ok(Self {
            child: Some(child),
            port: launch.port,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|c| matches!(c.try_wait(), Ok(None)))
    }

    /// Sends SIGTERM and gives the game `grace` to exit, then kills it.
    pub fn shutdown(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        terminate(&child, self.port);

        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(port = self.port, %status, "game exited");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(port = self.port, "polling game process failed: {e}");
                    break;
                }
            }
        }

        if let Err(e) = child.kill() {
            tracing::debug!(port = self.port, "killing game process failed: {e}");
        }
        if let Err(e) = child.wait() {
            tracing::debug!(port = self.port, "reaping game process failed: {e}");
        }
    }
}

/// Asks the game to quit; SDL turns SIGTERM into a quit event.
#[cfg(unix)]
fn terminate(child: &Child, port: u16) {
    use nix::{
        sys::signal::{kill, Signal},
        unistd::Pid,
    };

    if let Err(e) = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM) {
        tracing::debug!(port, "sending SIGTERM to game failed: {e}");
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child, _port: u16) {}

impl Drop for GameProcess {
    fn drop(&mut self) {
        self.shutdown(DROP_GRACE);
    }
}

#[cfg(all(test, unix))]
mod test {
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    use crate::env::base::EnvError;

    use super::{GameLaunch, GameProcess};

    fn launch(executable: PathBuf) -> GameLaunch {
        GameLaunch {
            executable,
            port: 5555,
            speed: 2.0,
            headless: true,
        }
    }

    #[test]
    fn test_args() {
        let mut l = launch(PathBuf::from("build/starship_game"));
        assert_eq!(
            l.args(),
            vec!["--rl-mode", "--port=5555", "--speed=2", "--headless"]
        );

        l.headless = false;
        l.speed = 1.5;
        assert_eq!(l.args(), vec!["--rl-mode", "--port=5555", "--speed=1.5"]);
    }

    #[test]
    fn test_missing_executable() {
        let res = GameProcess::spawn(&launch(PathBuf::from("/definitely/not/here/starship_game")));

        assert!(matches!(res, Err(EnvError::ExecutableNotFound(_))));
    }

    /// Spawns a shell script standing in for the game.
    fn spawn_script(dir: &Path, body: &str) -> GameProcess {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake_game.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        // a concurrent fork elsewhere in the test binary can briefly hold the
        // script open for writing (ETXTBSY)
        (0..20)
            .find_map(|_| match GameProcess::spawn(&launch(script.clone())) {
                Err(EnvError::Spawn(e)) if e.raw_os_error() == Some(26) => {
                    std::thread::sleep(Duration::from_millis(50));
                    None
                }
                other => Some(other),
            })
            .unwrap()
            .unwrap()
    }

    fn wait_for(path: &Path) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !path.exists() {
            assert!(Instant::now() < deadline, "{} never appeared", path.display());
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_shutdown_terminates_gracefully() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");
        let clean = dir.path().join("clean_exit");

        let mut game = spawn_script(
            dir.path(),
            &format!(
                "trap 'touch {}; exit 0' TERM\ntouch {}\nwhile true; do sleep 0.05; done",
                clean.display(),
                ready.display()
            ),
        );
        wait_for(&ready);

        let start = Instant::now();
        game.shutdown(Duration::from_secs(5));

        assert!(clean.exists());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(game.id().is_none());
    }

    #[test]
    fn test_shutdown_kills_process_ignoring_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let ready = dir.path().join("ready");

        let mut game = spawn_script(
            dir.path(),
            &format!(
                "trap '' TERM\ntouch {}\nwhile true; do sleep 0.05; done",
                ready.display()
            ),
        );
        wait_for(&ready);
        assert!(game.is_running());

        let start = Instant::now();
        game.shutdown(Duration::from_millis(100));

        assert!(!game.is_running());
        assert!(game.id().is_none());
        assert!(start.elapsed() < Duration::from_secs(10));

        // second shutdown is a no-op
        game.shutdown(Duration::from_millis(100));
    }
}
