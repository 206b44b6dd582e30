use crate::error::{Result, SwmmRunError};
use crate::input::RunPaths;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// One invocation of `runswmm <inp> <rpt> <out>`.
#[derive(Debug, Clone)]
pub struct SwmmProcess {
    executable: PathBuf,
    timeout: Option<Duration>,
    running: Arc<AtomicBool>,
}

impl SwmmProcess {
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shares the flag cleared by the Ctrl+C handler.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn command_line(&self, paths: &RunPaths) -> Vec<String> {
        vec![
            self.executable.display().to_string(),
            paths.inp.display().to_string(),
            paths.rpt.display().to_string(),
            paths.out.display().to_string(),
        ]
    }

    /// Runs SWMM to completion, handing every non-blank console line to
    /// `on_line`. Returns the exit code (`-1` when killed by a signal).
    pub fn run<F>(&self, paths: &RunPaths, mut on_line: F) -> Result<i32>
    where
        F: FnMut(&str),
    {
        let mut child = self.spawn(paths)?;
        let started = Instant::now();

        let (tx, rx) = mpsc::channel::<String>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx.clone()));
        }
        drop(tx);

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    let line = line.trim_end();
                    if !line.trim().is_empty() {
                        on_line(line);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.check_interrupt(&mut child, started)?;
        }

        let status = self.wait(&mut child, started)?;
        for reader in readers {
            let _ = reader.join();
        }

        // Ctrl+C reaches the child too, so it may exit before the flag is polled.
        if !self.running.load(Ordering::SeqCst) {
            tracing::info!(status = %status, "SWMM exited after cancellation");
            return Err(SwmmRunError::Cancelled);
        }

        let exit_code = exit_code(status);
        tracing::info!(exit_code, elapsed_ms = started.elapsed().as_millis() as u64, "SWMM finished");
        Ok(exit_code)
    }

    fn spawn(&self, paths: &RunPaths) -> Result<Child> {
        let mut command = Command::new(&self.executable);
        command
            .arg(&paths.inp)
            .arg(&paths.rpt)
            .arg(&paths.out)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = paths.working_directory() {
            command.current_dir(dir);
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        tracing::debug!(executable = %self.executable.display(), inp = %paths.inp.display(), "spawning SWMM");

        command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SwmmRunError::ExecutableNotFound {
                details: format!("{} could not be started: {}", self.executable.display(), e),
            },
            _ => SwmmRunError::Io(e),
        })
    }

    fn wait(&self, child: &mut Child, started: Instant) -> Result<ExitStatus> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            self.check_interrupt(child, started)?;
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn check_interrupt(&self, child: &mut Child, started: Instant) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            terminate(child);
            return Err(SwmmRunError::Cancelled);
        }

        if let Some(timeout) = self.timeout {
            if started.elapsed() > timeout {
                terminate(child);
                return Err(SwmmRunError::Timeout {
                    seconds: timeout.as_secs(),
                });
            }
        }

        Ok(())
    }
}

fn spawn_line_reader<R>(stream: R, tx: Sender<String>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::warn!(error = %e, "failed to kill SWMM process");
    }
    let _ = child.wait();
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
