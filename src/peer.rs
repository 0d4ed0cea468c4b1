//! Peer Transport (C4) — TCP listener/outbound connections, rendezvous
//! publishing and discovery, event dispatch.
//!
//! A few behaviors worth calling out:
//! - the write loop requeues the unsent tail of a chunk (`requeue_front` in
//!   [`crate::codec`]), advanced by exactly the bytes actually written;
//! - EOF on a read fully tears down the connection (socket closed, removed
//!   from the connection map, buffer released);
//! - [`ChangeNotifier::schedule`] tracks every scheduled name unconditionally.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::codec::{Command, Decoder, Encoder, Event};
use crate::config::Config;
use crate::error::TransportError;
use crate::router::{parse_trash_key, RepoUsage, TrashKey};

const SERVER_VERSION: &str = "1";
const RENDEZVOUS_SUBDIR: &str = ".trailer/trashListeners";

/// Identifies one peer connection: which repository base it carries events
/// for, and where the remote listener can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub base_dir: PathBuf,
    pub hostname: String,
    pub port: u16,
}

/// Local subscriber notified of decoded peer events (the out-of-scope TUI
/// is one such subscriber).
pub trait EventListener: Send + Sync {
    fn on_event(&self, command: Command, trashname: &str);
}

fn rendezvous_dir(base: &Path, hidden: bool) -> PathBuf {
    let trash_dir = if hidden { ".Trash" } else { "Trash" };
    base.join(trash_dir).join(RENDEZVOUS_SUBDIR)
}

fn base_of(usage: &RepoUsage, home_base: &Path) -> PathBuf {
    match usage {
        RepoUsage::Home => home_base.to_path_buf(),
        RepoUsage::Top(b) => b.clone(),
    }
}

fn is_hidden(usage: &RepoUsage) -> bool {
    matches!(usage, RepoUsage::Top(_))
}

struct RendezvousInfo {
    hostname: String,
    port: u16,
    base_dir: PathBuf,
}

fn parse_rendezvous_file(path: &Path) -> Option<RendezvousInfo> {
    let contents = fs::read_to_string(path).ok()?;
    let mut lines = contents.lines();
    let _version = lines.next()?;
    let _protocol = lines.next()?;
    let hostname = lines.next()?.to_string();
    let port: u16 = lines.next()?.parse().ok()?;
    let base_dir = PathBuf::from(lines.next()?);
    Some(RendezvousInfo {
        hostname,
        port,
        base_dir,
    })
}

/// Publishes and retracts this process's rendezvous files.
struct BindNotifier {
    published: Mutex<HashMap<PathBuf, PathBuf>>, // repo base -> rendezvous file path
}

impl BindNotifier {
    fn new() -> Self {
        BindNotifier {
            published: Mutex::new(HashMap::new()),
        }
    }

    fn publish(&self, base: &Path, hidden: bool, hostname: &str, port: u16) -> std::io::Result<()> {
        let mut published = self.published.lock().unwrap();
        if published.contains_key(base) {
            return Ok(());
        }

        let dir = rendezvous_dir(base, hidden);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{port}_{hostname}"));
        let body = format!("{SERVER_VERSION}\ntcp\n{hostname}\n{port}\n{}\n", base.display());
        fs::write(&path, body)?;
        published.insert(base.to_path_buf(), path);
        Ok(())
    }

    fn shutdown(&self) {
        let mut published = self.published.lock().unwrap();
        for (_, path) in published.drain() {
            let _ = fs::remove_file(path);
        }
    }
}

/// Tracks discovery throttling per base and the still-scheduled trashnames
/// replayed to newly discovered peers.
struct ChangeNotifier {
    throttle: Duration,
    last_scan: Mutex<HashMap<PathBuf, Instant>>,
    scheduled: Mutex<HashMap<PathBuf, HashSet<String>>>,
}

impl ChangeNotifier {
    fn new(throttle: Duration) -> Self {
        ChangeNotifier {
            throttle,
            last_scan: Mutex::new(HashMap::new()),
            scheduled: Mutex::new(HashMap::new()),
        }
    }

    fn should_scan(&self, base: &Path) -> bool {
        let mut last = self.last_scan.lock().unwrap();
        let now = Instant::now();
        match last.get(base) {
            Some(t) if now.duration_since(*t) < self.throttle => false,
            _ => {
                last.insert(base.to_path_buf(), now);
                true
            }
        }
    }

    /// Tracks every scheduled name unconditionally, unlike a naively
    /// inverted condition that would only insert when the name is already
    /// present.
    fn schedule(&self, base: &Path, name: &str) {
        self.scheduled
            .lock()
            .unwrap()
            .entry(base.to_path_buf())
            .or_default()
            .insert(name.to_string());
    }

    fn unschedule(&self, base: &Path, name: &str) {
        if let Some(set) = self.scheduled.lock().unwrap().get_mut(base) {
            set.remove(name);
        }
    }

    fn still_scheduled(&self, base: &Path) -> Vec<String> {
        self.scheduled
            .lock()
            .unwrap()
            .get(base)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// A page-at-a-time freelist of fixed-size read buffers.
struct BufferPool {
    chunk_size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    fn new(chunk_size: usize, prefill: usize) -> Self {
        let free = (0..prefill).map(|_| vec![0u8; chunk_size]).collect();
        BufferPool {
            chunk_size,
            free: Mutex::new(free),
        }
    }

    fn acquire(&self) -> Vec<u8> {
        self.free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.chunk_size])
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        buf.resize(self.chunk_size, 0);
        self.free.lock().unwrap().push(buf);
    }
}

struct Connection {
    key: Option<ConnectionKey>,
    stream: TcpStream,
    decoder: Decoder,
    encoder: Arc<Encoder>,
}

struct Semaphore {
    count: Mutex<isize>,
    cv: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Semaphore {
            count: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn post(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.cv.notify_one();
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock().unwrap();
        if *count <= 0 {
            let (guard, _) = self.cv.wait_timeout(count, timeout).unwrap();
            count = guard;
        }
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }
}

/// TCP listener + outbound peer connections for one process.
pub struct Transport {
    config: Config,
    hostname: String,
    listener: TcpListener,
    pub port: u16,
    connections: Mutex<HashMap<RawFd, Connection>>,
    bind_notifier: BindNotifier,
    change_notifier: ChangeNotifier,
    buffer_pool: BufferPool,
    dispatch_queue: Mutex<VecDeque<(Vec<u8>, usize, RawFd)>>,
    dispatch_sem: Semaphore,
    listeners: Mutex<Vec<Arc<dyn EventListener>>>,
    shutdown: Arc<AtomicBool>,
}

impl Transport {
    /// Retries random ports in the configured range until `bind` succeeds.
    pub fn bind(config: Config, hostname: String) -> Result<Self, TransportError> {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let mut last_errno = 0;
        for _ in 0..config.bind_attempts {
            let port = rng.gen_range(config.port_range.low..config.port_range.high);
            match TcpListener::bind(("0.0.0.0", port)) {
                Ok(listener) => {
                    listener.set_nonblocking(true).map_err(|e| {
                        TransportError::CantListen(e.raw_os_error().unwrap_or(0))
                    })?;
                    let buffer_count = config.buffers_per_page;
                    return Ok(Transport {
                        port,
                        listener,
                        connections: Mutex::new(HashMap::new()),
                        bind_notifier: BindNotifier::new(),
                        change_notifier: ChangeNotifier::new(config.discovery_throttle),
                        buffer_pool: BufferPool::new(config.buffer_size, buffer_count),
                        dispatch_queue: Mutex::new(VecDeque::new()),
                        dispatch_sem: Semaphore::new(),
                        listeners: Mutex::new(Vec::new()),
                        shutdown: Arc::new(AtomicBool::new(false)),
                        hostname,
                        config,
                    });
                }
                Err(e) => last_errno = e.raw_os_error().unwrap_or(0),
            }
        }

        Err(TransportError::CantBind {
            port: 0,
            errno: last_errno,
        })
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Announces `usage`'s repository to peers by publishing a rendezvous
    /// file, driven by the Router's usage callback.
    pub fn announce(&self, home_base: &Path, usage: &RepoUsage) {
        let base = base_of(usage, home_base);
        if let Err(e) = self.bind_notifier.publish(&base, is_hidden(usage), &self.hostname, self.port) {
            log::warn!("could not publish rendezvous file for '{}': {e}", base.display());
        }
    }

    fn derive_base(&self, key: &TrashKey, home_base: &Path) -> PathBuf {
        match key {
            TrashKey::Home(_) => home_base.to_path_buf(),
            TrashKey::Qualified { base, .. } => base.clone(),
        }
    }

    /// Posts `(command, trashkey)` to every peer connection whose key's base
    /// matches the trashkey's derived base, after a throttled discovery
    /// scan for that base.
    pub fn post_event(&self, home_base: &Path, command: Command, trashkey: &str) {
        let key = parse_trash_key(trashkey);
        let base = self.derive_base(&key, home_base);
        let hidden = !matches!(key, TrashKey::Home(_));

        self.discover(&base, hidden);

        match command {
            Command::Schedule => self.change_notifier.schedule(&base, trashkey),
            Command::Unschedule | Command::Remove => self.change_notifier.unschedule(&base, trashkey),
            Command::Add => {}
        }

        let connections = self.connections.lock().unwrap();
        for conn in connections.values() {
            if conn.key.as_ref().map(|k| &k.base_dir) == Some(&base) {
                conn.encoder.encode(command, trashkey);
            }
        }
    }

    /// Throttled rendezvous-directory scan for `base`: connects to newly
    /// seen peers and tears down connections whose file vanished.
    fn discover(&self, base: &Path, hidden: bool) {
        if !self.change_notifier.should_scan(base) {
            return;
        }

        let dir = rendezvous_dir(base, hidden);
        let mut seen = HashSet::new();
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let Some(info) = parse_rendezvous_file(&entry.path()) else {
                    continue;
                };
                // Never connect to our own listener.
                if info.hostname == self.hostname && info.port == self.port {
                    continue;
                }

                let key = ConnectionKey {
                    base_dir: base.to_path_buf(),
                    hostname: info.hostname.clone(),
                    port: info.port,
                };
                seen.insert(key.clone());

                let already_connected = self
                    .connections
                    .lock()
                    .unwrap()
                    .values()
                    .any(|c| c.key.as_ref() == Some(&key));
                if !already_connected {
                    self.connect_peer(key, base);
                }
            }
        }

        self.drop_vanished(base, &seen);
    }

    fn connect_peer(&self, key: ConnectionKey, base: &Path) {
        let addr = format!("{}:{}", key.hostname, key.port);
        let Some(sockaddr) = addr.to_socket_addrs().ok().and_then(|mut a| a.next()) else {
            let err = TransportError::CantResolveHostname(key.hostname.clone());
            log::warn!("{err}");
            return;
        };

        let stream = match TcpStream::connect_timeout(&sockaddr, Duration::from_secs(2)) {
            Ok(s) => s,
            Err(e) => {
                let err = TransportError::CantConnect {
                    host: key.hostname.clone(),
                    port: key.port,
                    errno: e.raw_os_error().unwrap_or(0),
                };
                log::warn!("{err}");
                return;
            }
        };
        let _ = stream.set_nonblocking(true);

        let encoder = Arc::new(Encoder::new());
        for name in self.change_notifier.still_scheduled(base) {
            encoder.encode(Command::Schedule, &name);
        }

        let fd = stream.as_raw_fd();
        self.connections.lock().unwrap().insert(
            fd,
            Connection {
                key: Some(key),
                stream,
                decoder: Decoder::new(),
                encoder,
            },
        );
    }

    fn drop_vanished(&self, base: &Path, seen: &HashSet<ConnectionKey>) {
        let mut connections = self.connections.lock().unwrap();
        let gone: Vec<RawFd> = connections
            .iter()
            .filter(|(_, c)| {
                c.key
                    .as_ref()
                    .map(|k| k.base_dir == *base && !seen.contains(k))
                    .unwrap_or(false)
            })
            .map(|(fd, _)| *fd)
            .collect();

        for fd in gone {
            connections.remove(&fd);
        }
    }

    /// Listener + read + write loop. Runs until `shutdown` is called.
    /// One-thread mode combines accept/read/write on one select; two-thread
    /// mode is approximated by running this twice with the write half
    /// skipped in one copy (see [`Transport::run_two_thread`]).
    pub fn run_single_thread(self: &Arc<Self>) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.accept_ready();
            self.read_ready();
            self.write_ready();
            std::thread::sleep(self.config.select_timeout);
        }
    }

    /// One accept/read/write tick, for a short-lived process that wants to
    /// flush a just-posted event to already-discovered peers without
    /// running a full server loop.
    pub fn pump(&self) {
        self.accept_ready();
        self.read_ready();
        self.write_ready();
    }

    pub fn run_two_thread(self: &Arc<Self>) -> (std::thread::JoinHandle<()>, std::thread::JoinHandle<()>) {
        let read_half = Arc::clone(self);
        let reader = std::thread::spawn(move || {
            while !read_half.shutdown.load(Ordering::Relaxed) {
                read_half.accept_ready();
                read_half.read_ready();
                std::thread::sleep(read_half.config.select_timeout);
            }
        });

        let write_half = Arc::clone(self);
        let writer = std::thread::spawn(move || {
            while !write_half.shutdown.load(Ordering::Relaxed) {
                write_half.write_ready();
                std::thread::sleep(write_half.config.select_timeout);
            }
        });

        (reader, writer)
    }

    pub fn run_dispatch_thread(self: &Arc<Self>) -> std::thread::JoinHandle<()> {
        let transport = Arc::clone(self);
        std::thread::spawn(move || {
            while !transport.shutdown.load(Ordering::Relaxed) {
                if !transport.dispatch_sem.wait_timeout(transport.config.select_timeout) {
                    continue;
                }
                let item = transport.dispatch_queue.lock().unwrap().pop_front();
                let Some((buf, len, fd)) = item else { continue };
                transport.dispatch_one(buf, len, fd);
            }
        })
    }

    fn dispatch_one(&self, buf: Vec<u8>, len: usize, fd: RawFd) {
        let events = {
            let mut connections = self.connections.lock().unwrap();
            match connections.get_mut(&fd) {
                Some(conn) => conn.decoder.push_bytes(&buf[..len]),
                None => Vec::new(),
            }
        };

        for event in events {
            match event {
                Event::Known { command, name } => {
                    let listeners = self.listeners.lock().unwrap();
                    for listener in listeners.iter() {
                        listener.on_event(command, &name);
                    }
                }
                Event::Undefined { .. } => {
                    // Unrecognized command byte: drop.
                }
            }
        }

        self.buffer_pool.release(buf);
    }

    fn accept_ready(&self) {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                let _ = stream.set_nonblocking(true);
                let fd = stream.as_raw_fd();
                self.connections.lock().unwrap().insert(
                    fd,
                    Connection {
                        key: None,
                        stream,
                        decoder: Decoder::new(),
                        encoder: Arc::new(Encoder::new()),
                    },
                );
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                let err = TransportError::NoAllocSock(e.raw_os_error().unwrap_or(0));
                log::warn!("accept() failed: {err}");
            }
        }
    }

    fn read_ready(&self) {
        let fds: Vec<RawFd> = self.connections.lock().unwrap().keys().copied().collect();
        for fd in fds {
            let mut buf = self.buffer_pool.acquire();
            let read_result = {
                let mut connections = self.connections.lock().unwrap();
                connections.get_mut(&fd).map(|c| c.stream.read(&mut buf))
            };

            match read_result {
                Some(Ok(0)) => {
                    // EOF: full teardown.
                    self.teardown(fd);
                    self.buffer_pool.release(buf);
                }
                Some(Ok(n)) => {
                    self.dispatch_queue.lock().unwrap().push_back((buf, n, fd));
                    self.dispatch_sem.post();
                }
                Some(Err(e)) if e.kind() == ErrorKind::WouldBlock => {
                    self.buffer_pool.release(buf);
                }
                Some(Err(e)) => {
                    let err = TransportError::ReadError(e.raw_os_error().unwrap_or(0));
                    log::warn!("read error on fd {fd}: {err}");
                    self.teardown(fd);
                    self.buffer_pool.release(buf);
                }
                None => self.buffer_pool.release(buf),
            }
        }
    }

    fn write_ready(&self) {
        let fds: Vec<RawFd> = self.connections.lock().unwrap().keys().copied().collect();
        for fd in fds {
            let chunk = {
                let connections = self.connections.lock().unwrap();
                connections
                    .get(&fd)
                    .map(|c| c.encoder.output(self.config.buffer_size))
            };
            let Some(chunk) = chunk else { continue };
            if chunk.is_empty() {
                continue;
            }

            let mut connections = self.connections.lock().unwrap();
            let Some(conn) = connections.get_mut(&fd) else {
                continue;
            };

            match conn.stream.write(&chunk) {
                Ok(sent) if sent < chunk.len() => {
                    // Requeue the remainder, advanced by exactly `sent`
                    // bytes rather than a pointer-sized offset.
                    conn.encoder.requeue_front(&chunk[sent..]);
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    conn.encoder.requeue_front(&chunk);
                }
                Err(e) => {
                    let err = TransportError::WriteError(e.raw_os_error().unwrap_or(0));
                    log::warn!("write error on fd {fd}: {err}");
                    drop(connections);
                    self.teardown(fd);
                }
            }
        }
    }

    /// Fully closes and forgets a connection: socket dropped, removed from
    /// the connection map.
    fn teardown(&self, fd: RawFd) {
        self.connections.lock().unwrap().remove(&fd);
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.bind_notifier.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendezvous_round_trips_through_disk() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let base = std::env::temp_dir().join(format!("trash-rs-rendezvous-{nanos}"));
        std::fs::create_dir_all(&base).unwrap();

        let notifier = BindNotifier::new();
        notifier.publish(&base, false, "localhost", 23045).unwrap();

        let path = rendezvous_dir(&base, false).join("23045_localhost");
        let info = parse_rendezvous_file(&path).unwrap();
        assert_eq!(info.hostname, "localhost");
        assert_eq!(info.port, 23045);
        assert_eq!(info.base_dir, base);

        notifier.shutdown();
        assert!(!path.exists());
    }

    #[test]
    fn change_notifier_tracks_every_scheduled_name() {
        let notifier = ChangeNotifier::new(Duration::from_secs(2));
        let base = PathBuf::from("/home/user/.local/share");

        notifier.schedule(&base, "a");
        notifier.schedule(&base, "b");
        let mut names = notifier.still_scheduled(&base);
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        notifier.unschedule(&base, "a");
        assert_eq!(notifier.still_scheduled(&base), vec!["b".to_string()]);
    }

    #[test]
    fn change_notifier_throttles_successive_scans() {
        let notifier = ChangeNotifier::new(Duration::from_secs(2));
        let base = PathBuf::from("/home/user/.local/share");
        assert!(notifier.should_scan(&base));
        assert!(!notifier.should_scan(&base));
    }

    #[test]
    fn buffer_pool_reuses_released_buffers() {
        let pool = BufferPool::new(64, 1);
        let buf = pool.acquire();
        assert_eq!(buf.len(), 64);
        pool.release(buf);
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
