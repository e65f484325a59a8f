//! Encoder process launching
//!
//! The supervisor talks to encoders only through [`EncoderLauncher`] and
//! [`EncoderChild`], so the production launcher spawns real processes while tests
//! substitute in-memory encoders.

use std::future::Future;
use std::io;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use super::command::EncoderCommand;

/// Boxed encoder standard input
pub type EncoderInput = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed encoder diagnostic output
pub type EncoderOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Control surface of a running encoder
pub trait EncoderChild: Send + 'static {
    /// Wait for the process to exit, yielding its exit code (`None` if killed by a signal)
    fn wait(&mut self) -> impl Future<Output = io::Result<Option<i32>>> + Send;

    /// Ask the process to terminate
    fn terminate(&mut self) -> io::Result<()>;
}

/// A freshly spawned encoder with its I/O handles detached
pub struct EncoderProcess<C> {
    /// Process control
    pub child: C,
    /// Standard input, fed by the stream pipe
    pub stdin: EncoderInput,
    /// Diagnostic channel (stderr)
    pub stderr: EncoderOutput,
    /// OS process id, if any
    pub pid: Option<u32>,
}

/// Spawns encoder processes
pub trait EncoderLauncher: Send + 'static {
    /// Concrete process control type
    type Child: EncoderChild;

    /// Start an encoder for the given command
    fn launch(&self, command: &EncoderCommand) -> io::Result<EncoderProcess<Self::Child>>;
}

/// Launches encoders as OS subprocesses
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl EncoderLauncher for ProcessLauncher {
    type Child = ChildProcess;

    fn launch(&self, command: &EncoderCommand) -> io::Result<EncoderProcess<ChildProcess>> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("encoder stdin was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("encoder stderr was not captured"))?;
        let pid = child.id();

        Ok(EncoderProcess {
            child: ChildProcess(child),
            stdin: Box::new(stdin),
            stderr: Box::new(stderr),
            pid,
        })
    }
}

/// OS subprocess control
#[derive(Debug)]
pub struct ChildProcess(Child);

impl EncoderChild for ChildProcess {
    fn wait(&mut self) -> impl Future<Output = io::Result<Option<i32>>> + Send {
        async move { self.0.wait().await.map(|status| status.code()) }
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.0.start_kill()
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory encoders for supervisor and engine tests

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::oneshot;

    use super::*;

    /// Test side of one launched encoder
    pub(crate) struct FakeEncoder {
        pub command: EncoderCommand,
        stdin: DuplexStream,
        stderr: DuplexStream,
        exit: Option<oneshot::Sender<Option<i32>>>,
        terminated: Arc<AtomicBool>,
    }

    impl FakeEncoder {
        /// Read exactly `len` bytes the supervisor fed into the encoder
        pub async fn read_input(&mut self, len: usize) -> Vec<u8> {
            let mut buf = vec![0u8; len];
            self.stdin.read_exact(&mut buf).await.unwrap();
            buf
        }

        /// Read until the supervisor closes the encoder input
        pub async fn read_to_end(&mut self) -> Vec<u8> {
            let mut buf = Vec::new();
            self.stdin.read_to_end(&mut buf).await.unwrap();
            buf
        }

        /// Emit diagnostic output
        pub async fn write_stderr(&mut self, text: &str) {
            self.stderr.write_all(text.as_bytes()).await.unwrap();
        }

        /// Make the process exit with `code`
        pub fn exit(&mut self, code: Option<i32>) {
            if let Some(tx) = self.exit.take() {
                let _ = tx.send(code);
            }
        }

        /// Check if the supervisor asked the process to terminate
        pub fn terminated(&self) -> bool {
            self.terminated.load(Ordering::SeqCst)
        }
    }

    pub(crate) struct FakeChild {
        exit: oneshot::Receiver<Option<i32>>,
        terminated: Arc<AtomicBool>,
    }

    impl EncoderChild for FakeChild {
        fn wait(&mut self) -> impl Future<Output = io::Result<Option<i32>>> + Send {
            async move {
                if self.terminated.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                match (&mut self.exit).await {
                    Ok(code) => Ok(code),
                    // Test dropped its handle without exiting: keep running
                    Err(_) => std::future::pending().await,
                }
            }
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.terminated.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Launcher that records every launch
    #[derive(Clone, Default)]
    pub(crate) struct FakeLauncher {
        launched: Arc<Mutex<Vec<FakeEncoder>>>,
        count: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    impl FakeLauncher {
        /// Total launches so far
        pub fn launch_count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }

        /// Take the encoders launched since the last call
        pub fn take(&self) -> Vec<FakeEncoder> {
            std::mem::take(&mut *self.launched.lock().unwrap())
        }

        /// Take the single encoder launched since the last call
        pub fn take_one(&self) -> FakeEncoder {
            let mut launched = self.take();
            assert_eq!(launched.len(), 1, "expected exactly one launch");
            launched.remove(0)
        }

        /// Make subsequent launches fail
        pub fn fail_launches(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    impl EncoderLauncher for FakeLauncher {
        type Child = FakeChild;

        fn launch(&self, command: &EncoderCommand) -> io::Result<EncoderProcess<FakeChild>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such encoder"));
            }

            let (stdin_process, stdin_test) = tokio::io::duplex(64 * 1024);
            let (stderr_process, stderr_test) = tokio::io::duplex(64 * 1024);
            let (exit_tx, exit_rx) = oneshot::channel();
            let terminated = Arc::new(AtomicBool::new(false));

            self.launched.lock().unwrap().push(FakeEncoder {
                command: command.clone(),
                stdin: stdin_test,
                stderr: stderr_test,
                exit: Some(exit_tx),
                terminated: Arc::clone(&terminated),
            });
            self.count.fetch_add(1, Ordering::SeqCst);

            Ok(EncoderProcess {
                child: FakeChild {
                    exit: exit_rx,
                    terminated,
                },
                stdin: Box::new(stdin_process),
                stderr: Box::new(stderr_process),
                pid: None,
            })
        }
    }
}
