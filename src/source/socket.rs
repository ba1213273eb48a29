//! Unix datagram socket source.
//!
//! Each datagram carries exactly one packet. The socket is bound synchronously
//! so that `start()` fails immediately when the path is unusable; receiving
//! happens on a dedicated thread driving a current-thread tokio runtime until
//! the source is stopped.

use std::path::{Path, PathBuf};

use crate::Result;

#[cfg(unix)]
use {
    super::{PacketReceiver, route_packet},
    crate::SessionError,
    std::sync::Arc,
    std::thread::JoinHandle,
    tokio::net::UnixDatagram,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info},
};

#[cfg(unix)]
pub struct UnixSocketSource {
    path: PathBuf,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl UnixSocketSource {
    /// Bind `path` and start delivering packets to `receiver`.
    ///
    /// A stale socket file at `path` is replaced.
    pub fn start(
        path: impl Into<PathBuf>,
        buffer_size: usize,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<Self> {
        let path = path.into();
        let resource = || format!("socket {}", path.display());

        if path.exists() {
            debug!(path = %path.display(), "removing stale socket file");
            let _ = std::fs::remove_file(&path);
        }

        let std_socket = std::os::unix::net::UnixDatagram::bind(&path)
            .map_err(|e| SessionError::resource_acquisition_with_source(resource(), Box::new(e)))?;

        match Self::spawn_receiver(&path, std_socket, buffer_size, receiver) {
            Ok(source) => {
                info!(path = %path.display(), "socket source started");
                Ok(source)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                Err(e)
            }
        }
    }

    fn spawn_receiver(
        path: &Path,
        std_socket: std::os::unix::net::UnixDatagram,
        buffer_size: usize,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<Self> {
        let resource = || format!("socket {}", path.display());
        std_socket
            .set_nonblocking(true)
            .map_err(|e| SessionError::resource_acquisition_with_source(resource(), Box::new(e)))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SessionError::resource_acquisition_with_source("socket runtime", Box::new(e)))?;

        let socket = {
            let _guard = runtime.enter();
            UnixDatagram::from_std(std_socket)
                .map_err(|e| SessionError::resource_acquisition_with_source(resource(), Box::new(e)))?
        };

        let cancel = CancellationToken::new();
        let cancel_reader = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("subtrack-socket".to_string())
            .spawn(move || {
                runtime.block_on(receive_loop(socket, buffer_size, receiver, cancel_reader));
            })
            .map_err(|e| SessionError::resource_acquisition_with_source("socket thread", Box::new(e)))?;

        Ok(Self { path: path.to_path_buf(), cancel, thread: Some(thread) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop receiving, join the receiver thread and remove the socket file.
    /// Safe to call more than once.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(path = %self.path.display(), "socket thread panicked");
            }
            let _ = std::fs::remove_file(&self.path);
            info!(path = %self.path.display(), "socket source stopped");
        }
    }
}

#[cfg(unix)]
impl Drop for UnixSocketSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
async fn receive_loop(
    socket: UnixDatagram,
    buffer_size: usize,
    receiver: Arc<dyn PacketReceiver>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; buffer_size.max(crate::protocol::HEADER_SIZE)];
    let mut datagrams = 0u64;

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("socket receive cancelled");
                break;
            }
            result = socket.recv(&mut buf) => result,
        };

        match received {
            Ok(len) => {
                datagrams += 1;
                route_packet(&buf[..len], receiver.as_ref());
            }
            Err(e) => {
                error!(error = %e, "socket receive failed");
                receiver.on_stream_broken();
                break;
            }
        }
    }

    debug!(datagrams, "socket receive loop ended");
}

#[cfg(not(unix))]
pub struct UnixSocketSource {
    _private: (),
}

#[cfg(not(unix))]
impl UnixSocketSource {
    /// Socket sources need Unix domain sockets; this always fails elsewhere.
    pub fn start(
        _path: impl Into<PathBuf>,
        _buffer_size: usize,
        _receiver: std::sync::Arc<dyn super::PacketReceiver>,
    ) -> Result<Self> {
        Err(crate::SessionError::unsupported_platform("Socket packet source", "Unix"))
    }

    pub fn path(&self) -> &Path {
        Path::new("")
    }

    pub fn stop(&mut self) {}
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::protocol::{Packet, PacketCodec, PacketType};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Collector {
        packets: Mutex<Vec<PacketType>>,
        buffers: Mutex<usize>,
    }

    impl PacketReceiver for Collector {
        fn on_packet_received(&self, packet: &Packet) {
            self.packets.lock().unwrap().push(packet.packet_type);
        }

        fn add_buffer(&self, _buffer: Vec<u8>) -> bool {
            *self.buffers.lock().unwrap() += 1;
            true
        }

        fn on_stream_broken(&self) {}
    }

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("subtrack-{}-{}.sock", name, std::process::id()))
    }

    #[test]
    fn datagrams_are_routed_until_stopped() {
        let _ = tracing_subscriber::fmt::try_init();
        let path = socket_path("route");
        let collector = Arc::new(Collector::default());
        let mut source = UnixSocketSource::start(&path, 4096, collector.clone()).unwrap();
        assert!(path.exists());

        let codec = PacketCodec::default();
        let client = std::os::unix::net::UnixDatagram::unbound().unwrap();
        client.send_to(&codec.encode_control(PacketType::Pause), &path).unwrap();
        client.send_to(&codec.encode_pes_data(b"data"), &path).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline
            && (collector.packets.lock().unwrap().is_empty() || *collector.buffers.lock().unwrap() == 0)
        {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(*collector.packets.lock().unwrap(), [PacketType::Pause]);
        assert_eq!(*collector.buffers.lock().unwrap(), 1);

        source.stop();
        assert!(!path.exists());
        source.stop();
    }

    #[test]
    fn unbindable_path_fails_start() {
        let path = std::env::temp_dir().join("subtrack-missing-dir").join("nested").join("x.sock");
        let result = UnixSocketSource::start(&path, 4096, Arc::new(Collector::default()));
        assert!(matches!(result, Err(SessionError::ResourceAcquisition { .. })));
    }
}
