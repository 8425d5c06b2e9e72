use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;

/// A program and its arguments. Run directly, never through a shell.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Space-joined rendering for logs and notices
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Everything a subprocess wrote, stdout and stderr merged in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    pub text: String,
}

enum StreamEvent {
    Chunk(Vec<u8>),
    Closed,
}

/// Launches one OS process per call. Processes are never pooled or reused.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn `command` in `cwd` and start streaming both of its output pipes
    /// into a single channel. `generation` is carried on the handle so the
    /// owner can tell stale runs from current ones.
    pub fn spawn(command: &CommandLine, cwd: &Path, generation: u64) -> io::Result<RunHandle> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = mpsc::channel::<StreamEvent>();
        let mut open_streams = 0;

        if let Some(stdout) = child.stdout.take() {
            pump(stdout, tx.clone());
            open_streams += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, tx);
            open_streams += 1;
        }

        log::info!(
            "spawned #{} (pid {}): {}",
            generation,
            child.id(),
            command.display()
        );

        Ok(RunHandle {
            generation,
            child,
            rx,
            buffer: Vec::new(),
            open_streams,
            exit: None,
            finished: false,
        })
    }
}

/// Forward every chunk read from `stream` until EOF, then report the close.
fn pump<R: Read + Send + 'static>(mut stream: R, tx: mpsc::Sender<StreamEvent>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(StreamEvent::Chunk(buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = tx.send(StreamEvent::Closed);
    });
}

/// A running subprocess. Resolves once both pipes are closed and the
/// process has exited; the exit code is logged but never interpreted.
pub struct RunHandle {
    generation: u64,
    child: Child,
    rx: mpsc::Receiver<StreamEvent>,
    buffer: Vec<u8>,
    open_streams: usize,
    exit: Option<ExitStatus>,
    finished: bool,
}

impl RunHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Non-blocking: drain whatever arrived so far. Returns the merged output
    /// exactly once, on the first poll after termination.
    pub fn poll(&mut self) -> Option<RawOutput> {
        if self.finished {
            return None;
        }

        loop {
            match self.rx.try_recv() {
                Ok(event) => self.absorb(event),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.open_streams = 0;
                    break;
                }
            }
        }

        if self.open_streams > 0 {
            return None;
        }

        if self.exit.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exit = Some(status),
                Ok(None) => return None,
                Err(e) => {
                    log::warn!("#{}: could not query exit status: {}", self.generation, e);
                }
            }
        }

        Some(self.finish())
    }

    /// Block until the process terminates.
    pub fn wait(mut self) -> RawOutput {
        while self.open_streams > 0 {
            match self.rx.recv() {
                Ok(event) => self.absorb(event),
                Err(_) => self.open_streams = 0,
            }
        }
        match self.child.wait() {
            Ok(status) => self.exit = Some(status),
            Err(e) => log::warn!("#{}: wait failed: {}", self.generation, e),
        }
        self.finish()
    }

    /// Kill the process. Output collected so far is discarded.
    pub fn cancel(&mut self) {
        if self.finished {
            return;
        }
        log::info!("cancelling #{} (pid {})", self.generation, self.child.id());
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.finished = true;
    }

    fn absorb(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Chunk(bytes) => self.buffer.extend_from_slice(&bytes),
            StreamEvent::Closed => self.open_streams = self.open_streams.saturating_sub(1),
        }
    }

    fn finish(&mut self) -> RawOutput {
        self.finished = true;
        log::debug!(
            "#{} exited ({:?}) with {} bytes of output",
            self.generation,
            self.exit.and_then(|s| s.code()),
            self.buffer.len()
        );
        let bytes = std::mem::take(&mut self.buffer);
        RawOutput {
            text: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
