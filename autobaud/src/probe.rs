//! Brute-force handshake search over (port, baud rate) candidates.
//!
//! For every eligible device the prober walks the candidate baud rates from
//! low to high. Each candidate gets its own [`SerialSession`]: open, write
//! the handshake command, one bounded read, close. The first candidate whose
//! reply decodes as non-empty text wins and ends the whole search.
//!
//! A wrong baud rate shows up as garbled bytes or silence, so decode failures,
//! timeouts and transport faults are all recovered locally and the search
//! moves on. Only cancellation escapes the loop as an error.
//!
//! ## Example
//!
//! ```rust,no_run
//! use autobaud::{NativeTransport, ProbeConfig, Prober, device};
//!
//! fn main() -> autobaud::Result<()> {
//!     let devices = device::filter_by_vendor(device::enumerate_native()?, &["wch.cn"]);
//!     let prober = Prober::new(NativeTransport, ProbeConfig::default());
//!     println!("{}", prober.probe(&devices)?);
//!     Ok(())
//! }
//! ```

use std::{
    collections::HashSet,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    device::DeviceRecord,
    error::{Error, Result},
    port::{SerialSession, SerialTransport},
};

/// Baud rates tried when the caller does not supply any, lowest first.
pub const DEFAULT_BAUD_RATES: &[u32] = &[
    300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Per-attempt read timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Command written once per candidate.
pub const HANDSHAKE_COMMAND: &[u8] = b"$I\n";

/// Manufacturer strings that are never opened. Composite HID/CDC ports
/// report "Microsoft" and may be reserved by the OS.
pub const DEFAULT_SKIPPED_MANUFACTURERS: &[&str] = &["Microsoft"];

/// Terminal result of a probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize),
    serde(tag = "status", rename_all = "snake_case")
)]
pub enum ConnectionOutcome {
    /// A handshake succeeded on this port at this rate.
    Connected {
        /// Device path.
        port: String,
        /// Accepted baud rate.
        baud_rate: u32,
    },
    /// Every candidate was tried without an accepted reply.
    NotFound,
}

impl ConnectionOutcome {
    /// Whether a connection was found.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Ordered set of baud rates to try for each device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet(Vec<u32>);

impl CandidateSet {
    /// Build a candidate set, sorted ascending with duplicates removed.
    ///
    /// Zero is rejected; an empty list is allowed and makes every probe
    /// end in [`ConnectionOutcome::NotFound`].
    pub fn new(rates: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut rates: Vec<u32> = rates.into_iter().collect();
        if rates.contains(&0) {
            return Err(Error::Config("baud rate must be greater than zero".to_string()));
        }
        rates.sort_unstable();
        rates.dedup();
        Ok(Self(rates))
    }

    /// Rates in the order they are tried.
    pub fn rates(&self) -> &[u32] {
        &self.0
    }

    /// Number of rates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CandidateSet {
    fn default() -> Self {
        Self(DEFAULT_BAUD_RATES.to_vec())
    }
}

/// Prober settings.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Baud rates to try for each device.
    pub candidates: CandidateSet,
    /// Upper bound on each handshake read.
    pub handshake_timeout: Duration,
    /// Bytes written to start the handshake.
    pub command: Vec<u8>,
    /// Devices whose manufacturer matches one of these are never opened.
    pub skipped_manufacturers: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            candidates: CandidateSet::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            command: HANDSHAKE_COMMAND.to_vec(),
            skipped_manufacturers: DEFAULT_SKIPPED_MANUFACTURERS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl ProbeConfig {
    /// Replace the candidate baud rates.
    #[must_use]
    pub fn with_candidates(mut self, candidates: CandidateSet) -> Self {
        self.candidates = candidates;
        self
    }

    /// Set the per-attempt read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Replace the handshake command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<Vec<u8>>) -> Self {
        self.command = command.into();
        self
    }

    /// Replace the manufacturer deny-list.
    #[must_use]
    pub fn with_skipped_manufacturers<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.skipped_manufacturers = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Shared flag an external caller sets to abort a running search.
///
/// Checked between candidate attempts; an attempt already in flight runs
/// until its read returns.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why a candidate reply was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The read timed out with nothing received.
    NoResponse,
    /// Bytes arrived but are not valid UTF-8.
    NotText(Vec<u8>),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => write!(f, "no response"),
            Self::NotText(bytes) => write!(f, "non-text response {bytes:02X?}"),
        }
    }
}

/// Result of one handshake attempt.
#[derive(Debug)]
pub enum AttemptResult {
    /// The device answered with this text.
    Accepted(String),
    /// The reply does not indicate a matching baud rate.
    Rejected(RejectReason),
    /// Opening or using the session failed.
    TransportFault(Error),
}

/// Classify raw handshake reply bytes.
pub fn classify_response(bytes: Vec<u8>) -> AttemptResult {
    match String::from_utf8(bytes) {
        Err(e) => AttemptResult::Rejected(RejectReason::NotText(e.into_bytes())),
        Ok(text) if text.is_empty() => AttemptResult::Rejected(RejectReason::NoResponse),
        Ok(text) => AttemptResult::Accepted(text),
    }
}

/// Progress notification for one candidate about to be attempted.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Device path.
    pub path: &'a str,
    /// Baud rate.
    pub baud_rate: u32,
    /// Zero-based position in the whole search.
    pub index: usize,
    /// Number of candidates in the whole search.
    pub total: usize,
}

/// Runs the handshake search with a given transport.
pub struct Prober<T> {
    transport: T,
    config: ProbeConfig,
    cancel: CancelToken,
}

impl<T: SerialTransport> Prober<T> {
    /// Create a prober.
    pub fn new(transport: T, config: ProbeConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Whether `device` is excluded by the manufacturer deny-list.
    pub fn is_skipped(&self, device: &DeviceRecord) -> bool {
        device.manufacturer_in(&self.config.skipped_manufacturers)
    }

    /// Search `devices` in order and return the first accepted candidate.
    pub fn probe(&self, devices: &[DeviceRecord]) -> Result<ConnectionOutcome> {
        self.probe_with_progress(devices, &mut |_| {})
    }

    /// Like [`Prober::probe`], reporting each candidate before it is attempted.
    pub fn probe_with_progress(
        &self,
        devices: &[DeviceRecord],
        progress: &mut dyn FnMut(Candidate<'_>),
    ) -> Result<ConnectionOutcome> {
        let eligible = self.eligible(devices);
        let total = eligible.len() * self.config.candidates.len();
        let stop = || self.cancel_requested();

        for (n, device) in eligible.into_iter().enumerate() {
            let offset = n * self.config.candidates.len();
            let mut report = |path: &str, baud_rate: u32, i: usize| {
                progress(Candidate {
                    path,
                    baud_rate,
                    index: offset + i,
                    total,
                });
            };

            if let Some(baud_rate) = self.search_device(device, &stop, &mut report)? {
                return Ok(connected(device, baud_rate));
            }
        }

        info!("Couldn't connect to any device");
        Ok(ConnectionOutcome::NotFound)
    }

    /// Search devices concurrently, one thread per device.
    ///
    /// Each device is still searched rate by rate. The result is the first
    /// accepting device in input order, so it matches [`Prober::probe`]
    /// whenever at most one device would accept. Searches of later devices
    /// stop once an earlier device has accepted.
    pub fn probe_parallel(&self, devices: &[DeviceRecord]) -> Result<ConnectionOutcome>
    where
        T: Sync,
    {
        let eligible = self.eligible(devices);
        let winner = AtomicUsize::new(usize::MAX);

        let results: Vec<Result<Option<u32>>> = thread::scope(|scope| {
            let handles: Vec<_> = eligible
                .iter()
                .enumerate()
                .map(|(i, device)| {
                    let winner = &winner;
                    scope.spawn(move || {
                        let superseded = || winner.load(Ordering::Acquire) < i;
                        let stop = || superseded() || self.cancel_requested();
                        match self.search_device(device, &stop, &mut |_, _, _| {}) {
                            Ok(Some(rate)) => {
                                winner.fetch_min(i, Ordering::AcqRel);
                                Ok(Some(rate))
                            },
                            Err(Error::Interrupted) if superseded() => Ok(None),
                            other => other,
                        }
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(Error::Transport("probe worker panicked".to_string())))
                })
                .collect()
        });

        for (device, result) in eligible.iter().zip(results) {
            if let Some(baud_rate) = result? {
                return Ok(connected(device, baud_rate));
            }
        }

        info!("Couldn't connect to any device");
        Ok(ConnectionOutcome::NotFound)
    }

    /// Run one handshake on `path` at `baud_rate`.
    ///
    /// The session is closed before this returns, whatever the result.
    pub fn attempt(&self, path: &str, baud_rate: u32) -> AttemptResult {
        let mut session = match self
            .transport
            .open(path, baud_rate, self.config.handshake_timeout)
        {
            Ok(session) => session,
            Err(e) => return AttemptResult::TransportFault(e),
        };
        debug!("Opened {path} at {baud_rate}");

        let result = handshake(&mut session, &self.config.command);

        debug!("Closing connection to {path}");
        if let Err(e) = session.close() {
            warn!("Failed to close {path}: {e}");
        }

        result
    }

    /// Devices to search, in input order: deny-listed manufacturers and
    /// repeated paths are dropped so no port is ever opened twice at once.
    fn eligible<'a>(&self, devices: &'a [DeviceRecord]) -> Vec<&'a DeviceRecord> {
        let mut seen = HashSet::new();
        let mut eligible = Vec::with_capacity(devices.len());

        for device in devices {
            if self.is_skipped(device) {
                debug!(
                    "Skipping device {} ({} device)",
                    device.path,
                    device.manufacturer.as_deref().unwrap_or_default()
                );
                continue;
            }
            if !seen.insert(device.path.as_str()) {
                debug!("Skipping repeated device {}", device.path);
                continue;
            }
            eligible.push(device);
        }

        eligible
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled() || crate::is_interrupted_requested()
    }

    /// Try every rate on one device; `Ok(None)` when none is accepted.
    fn search_device(
        &self,
        device: &DeviceRecord,
        stop: &dyn Fn() -> bool,
        progress: &mut dyn FnMut(&str, u32, usize),
    ) -> Result<Option<u32>> {
        let port = device.path.as_str();

        for (i, &baud_rate) in self.config.candidates.rates().iter().enumerate() {
            if stop() {
                return Err(Error::Interrupted);
            }

            progress(port, baud_rate, i);
            debug!("Attempting connection to {port} with baudrate {baud_rate}");

            match self.attempt(port, baud_rate) {
                AttemptResult::Accepted(text) => {
                    info!("Response from {port} at {baud_rate}: {}", text.trim_end());
                    info!("Successfully connected on {port} at {baud_rate}");
                    return Ok(Some(baud_rate));
                },
                AttemptResult::Rejected(reason) => {
                    debug!("Rejected {port} at {baud_rate}: {reason}");
                },
                AttemptResult::TransportFault(e) => {
                    debug!("Failed to connect to {port} at {baud_rate}: {e}");
                },
            }
        }

        Ok(None)
    }
}

fn handshake<S: SerialSession>(session: &mut S, command: &[u8]) -> AttemptResult {
    if let Err(e) = session.write_all_bytes(command) {
        return AttemptResult::TransportFault(e);
    }

    match session.read_response() {
        Ok(bytes) => classify_response(bytes),
        Err(e) => AttemptResult::TransportFault(e),
    }
}

fn connected(device: &DeviceRecord, baud_rate: u32) -> ConnectionOutcome {
    ConnectionOutcome::Connected {
        port: device.path.clone(),
        baud_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// What the stub device does for one (path, rate).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Behavior {
        Reply,
        Garble,
        Silent,
        OpenFails,
        ReadFails,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Open(String, u32),
        Write(String, Vec<u8>),
        Close(String),
    }

    #[derive(Default)]
    struct Log {
        events: Mutex<Vec<Event>>,
    }

    impl Log {
        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn opens(&self) -> Vec<(String, u32)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Open(p, r) => Some((p, r)),
                    _ => None,
                })
                .collect()
        }

        /// Most sessions ever open at the same time on `path`.
        fn peak_open(&self, path: &str) -> usize {
            let mut open = 0_usize;
            let mut peak = 0;
            for event in self.events() {
                match event {
                    Event::Open(p, _) if p == path => {
                        open += 1;
                        peak = peak.max(open);
                    },
                    Event::Close(p) if p == path => open -= 1,
                    _ => {},
                }
            }
            peak
        }

        fn closes(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, Event::Close(_)))
                .count()
        }
    }

    struct StubTransport {
        rule: Box<dyn Fn(&str, u32) -> Behavior + Send + Sync>,
        log: Arc<Log>,
    }

    impl StubTransport {
        fn new(rule: impl Fn(&str, u32) -> Behavior + Send + Sync + 'static) -> Self {
            Self {
                rule: Box::new(rule),
                log: Arc::default(),
            }
        }

        fn accepting(path: &'static str, rate: u32, otherwise: Behavior) -> Self {
            Self::new(move |p, r| {
                if p == path && r == rate {
                    Behavior::Reply
                } else {
                    otherwise
                }
            })
        }
    }

    struct StubSession {
        path: String,
        behavior: Behavior,
        log: Arc<Log>,
        open: bool,
    }

    impl SerialTransport for StubTransport {
        type Session = StubSession;

        fn open(&self, path: &str, baud_rate: u32, timeout: Duration) -> Result<StubSession> {
            assert_eq!(timeout, Duration::from_millis(10));
            let behavior = (self.rule)(path, baud_rate);
            if behavior == Behavior::OpenFails {
                return Err(Error::Transport(format!("{path} is busy")));
            }
            self.log.push(Event::Open(path.to_string(), baud_rate));
            Ok(StubSession {
                path: path.to_string(),
                behavior,
                log: Arc::clone(&self.log),
                open: true,
            })
        }
    }

    impl SerialSession for StubSession {
        fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
            assert!(self.open);
            self.log.push(Event::Write(self.path.clone(), buf.to_vec()));
            Ok(())
        }

        fn read_response(&mut self) -> Result<Vec<u8>> {
            assert!(self.open);
            match self.behavior {
                Behavior::Reply => Ok(b"Grbl 1.1h ['$' for help]\r\n".to_vec()),
                Behavior::Garble => Ok(vec![0xFF, 0xFE, 0x80, 0x00]),
                Behavior::Silent => Ok(Vec::new()),
                Behavior::ReadFails => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device unplugged",
                ))),
                Behavior::OpenFails => unreachable!(),
            }
        }

        fn close(&mut self) -> Result<()> {
            assert!(self.open, "double close on {}", self.path);
            self.open = false;
            self.log.push(Event::Close(self.path.clone()));
            Ok(())
        }
    }

    fn config(rates: &[u32]) -> ProbeConfig {
        ProbeConfig::default()
            .with_candidates(CandidateSet::new(rates.iter().copied()).unwrap())
            .with_timeout(Duration::from_millis(10))
    }

    fn device(path: &str, manufacturer: &str) -> DeviceRecord {
        DeviceRecord::new(path).with_manufacturer(manufacturer)
    }

    #[test]
    fn test_candidate_set_default_order() {
        let set = CandidateSet::default();
        assert_eq!(set.len(), 13);
        assert_eq!(set.rates().first(), Some(&300));
        assert_eq!(set.rates().last(), Some(&921600));
        assert!(set.rates().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_candidate_set_sorts_and_dedups() {
        let set = CandidateSet::new([115200, 9600, 115200, 300]).unwrap();
        assert_eq!(set.rates(), [300, 9600, 115200]);
    }

    #[test]
    fn test_candidate_set_rejects_zero() {
        assert!(matches!(CandidateSet::new([0, 9600]), Err(Error::Config(_))));
    }

    #[test]
    fn test_classify_response() {
        assert!(matches!(classify_response(b"ok\n".to_vec()), AttemptResult::Accepted(t) if t == "ok\n"));
        assert!(matches!(
            classify_response(Vec::new()),
            AttemptResult::Rejected(RejectReason::NoResponse)
        ));
        assert!(matches!(
            classify_response(vec![0xC3, 0x28]),
            AttemptResult::Rejected(RejectReason::NotText(b)) if b == [0xC3_u8, 0x28]
        ));
    }

    #[test]
    fn test_accepts_at_any_position_in_candidate_order() {
        let rates = [300, 9600, 57600, 115200, 921600];
        for &target in &rates {
            let transport = StubTransport::accepting("/dev/ttyUSB0", target, Behavior::Garble);
            let log = Arc::clone(&transport.log);
            let prober = Prober::new(transport, config(&rates));

            let outcome = prober.probe(&[device("/dev/ttyUSB0", "wch.cn")]).unwrap();

            assert_eq!(
                outcome,
                ConnectionOutcome::Connected {
                    port: "/dev/ttyUSB0".to_string(),
                    baud_rate: target,
                }
            );
            let opened: Vec<u32> = log.opens().into_iter().map(|(_, r)| r).collect();
            let expected: Vec<u32> = rates.iter().copied().take_while(|&r| r <= target).collect();
            assert_eq!(opened, expected);
            assert_eq!(log.closes(), opened.len(), "session left open");
        }
    }

    #[test]
    fn test_not_found_tries_every_candidate_once_in_order() {
        let transport = StubTransport::new(|_, _| Behavior::Silent);
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[9600, 1200, 115200]));

        let devices = [device("COM3", "wch.cn"), device("COM4", "wch.cn")];
        let outcome = prober.probe(&devices).unwrap();

        assert_eq!(outcome, ConnectionOutcome::NotFound);
        assert_eq!(
            log.opens(),
            [
                ("COM3".to_string(), 1200),
                ("COM3".to_string(), 9600),
                ("COM3".to_string(), 115200),
                ("COM4".to_string(), 1200),
                ("COM4".to_string(), 9600),
                ("COM4".to_string(), 115200),
            ]
        );
        assert_eq!(log.closes(), 6);
    }

    #[test]
    fn test_skipped_manufacturer_is_never_opened() {
        let transport = StubTransport::new(|_, _| Behavior::Reply);
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[9600]));

        let outcome = prober
            .probe(&[device("COM5", "Microsoft"), device("COM6", "wch.cn")])
            .unwrap();

        assert_eq!(
            outcome,
            ConnectionOutcome::Connected {
                port: "COM6".to_string(),
                baud_rate: 9600,
            }
        );
        assert!(log.opens().iter().all(|(p, _)| p != "COM5"));
    }

    #[test]
    fn test_custom_deny_list() {
        let transport = StubTransport::new(|_, _| Behavior::Reply);
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(
            transport,
            config(&[9600]).with_skipped_manufacturers(["FTDI"]),
        );

        let outcome = prober
            .probe(&[device("COM1", "FTDI"), device("COM5", "Microsoft")])
            .unwrap();

        assert!(outcome.is_connected());
        assert_eq!(log.opens(), [("COM5".to_string(), 9600)]);
    }

    #[test]
    fn test_close_once_per_attempt_on_every_path() {
        let transport = StubTransport::new(|_, rate| match rate {
            300 => Behavior::Garble,
            600 => Behavior::Silent,
            1200 => Behavior::ReadFails,
            2400 => Behavior::OpenFails,
            _ => Behavior::Reply,
        });
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[300, 600, 1200, 2400, 4800]));

        let outcome = prober.probe(&[device("COM3", "wch.cn")]).unwrap();

        assert_eq!(
            outcome,
            ConnectionOutcome::Connected {
                port: "COM3".to_string(),
                baud_rate: 4800,
            }
        );
        // 2400 never opened, so four sessions and four closes
        assert_eq!(log.opens().len(), 4);
        assert_eq!(log.closes(), 4);

        let events = log.events();
        for pair in events.windows(2) {
            if let Event::Open(..) = &pair[1] {
                assert!(
                    matches!(pair[0], Event::Close(_)),
                    "session opened while another was open: {events:?}"
                );
            }
        }
    }

    #[test]
    fn test_writes_handshake_command() {
        let transport = StubTransport::new(|_, _| Behavior::Reply);
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[9600]));

        prober.probe(&[device("COM3", "wch.cn")]).unwrap();

        assert!(log
            .events()
            .contains(&Event::Write("COM3".to_string(), b"$I\n".to_vec())));
    }

    #[test]
    fn test_empty_device_list_is_not_found() {
        let prober = Prober::new(StubTransport::new(|_, _| Behavior::Reply), config(&[9600]));
        assert_eq!(prober.probe(&[]).unwrap(), ConnectionOutcome::NotFound);
    }

    #[test]
    fn test_cancel_token_stops_between_attempts() {
        let token = CancelToken::new();
        let transport = StubTransport::new(|_, _| Behavior::Silent);
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[300, 600, 1200])).with_cancel_token(token.clone());

        let mut seen = 0;
        let result = prober.probe_with_progress(&[device("COM3", "wch.cn")], &mut |_| {
            seen += 1;
            if seen == 2 {
                token.cancel();
            }
        });

        assert!(matches!(result, Err(Error::Interrupted)));
        assert_eq!(log.opens().len(), 2);
        assert_eq!(log.closes(), 2);
    }

    #[test]
    fn test_progress_reports_every_candidate() {
        let prober = Prober::new(StubTransport::new(|_, _| Behavior::Silent), config(&[300, 600]));
        let mut seen = Vec::new();

        prober
            .probe_with_progress(
                &[device("A", "wch.cn"), device("X", "Microsoft"), device("B", "wch.cn")],
                &mut |c| seen.push((c.path.to_string(), c.baud_rate, c.index, c.total)),
            )
            .unwrap();

        assert_eq!(
            seen,
            [
                ("A".to_string(), 300, 0, 4),
                ("A".to_string(), 600, 1, 4),
                ("B".to_string(), 300, 2, 4),
                ("B".to_string(), 600, 3, 4),
            ]
        );
    }

    #[test]
    fn test_parallel_prefers_enumeration_order() {
        // Both devices accept; B at a lower rate, so it would finish first.
        let transport = StubTransport::new(|path, rate| match (path, rate) {
            ("A", 921600) | ("B", 300) => Behavior::Reply,
            _ => Behavior::Silent,
        });
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[300, 9600, 921600]));

        let outcome = prober
            .probe_parallel(&[device("A", "wch.cn"), device("B", "wch.cn")])
            .unwrap();

        assert_eq!(
            outcome,
            ConnectionOutcome::Connected {
                port: "A".to_string(),
                baud_rate: 921600,
            }
        );
        assert_eq!(log.opens().len(), log.closes());
    }

    #[test]
    fn test_parallel_not_found_and_skip_rule() {
        let transport = StubTransport::new(|path, _| {
            assert_ne!(path, "COM5");
            Behavior::Garble
        });
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[9600, 115200]));

        let outcome = prober
            .probe_parallel(&[device("COM3", "wch.cn"), device("COM5", "Microsoft")])
            .unwrap();

        assert_eq!(outcome, ConnectionOutcome::NotFound);
        assert_eq!(log.opens().len(), 2);
        assert_eq!(log.closes(), 2);
    }

    #[test]
    fn test_parallel_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let prober = Prober::new(StubTransport::new(|_, _| Behavior::Reply), config(&[9600]))
            .with_cancel_token(token);

        let result = prober.probe_parallel(&[device("COM3", "wch.cn")]);
        assert!(matches!(result, Err(Error::Interrupted)));
    }

    #[test]
    fn test_repeated_path_is_searched_once() {
        let transport = StubTransport::new(|_, _| Behavior::Silent);
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[9600, 115200]));

        let outcome = prober
            .probe(&[device("COM3", "wch.cn"), device("COM3", "wch.cn")])
            .unwrap();

        assert_eq!(outcome, ConnectionOutcome::NotFound);
        assert_eq!(
            log.opens(),
            [("COM3".to_string(), 9600), ("COM3".to_string(), 115200)]
        );
    }

    #[test]
    fn test_parallel_never_opens_a_path_twice_at_once() {
        let transport = StubTransport::new(|_, _| Behavior::Silent);
        let log = Arc::clone(&transport.log);
        let prober = Prober::new(transport, config(&[300, 9600, 115200]));

        let outcome = prober
            .probe_parallel(&[
                device("COM3", "wch.cn"),
                device("COM4", "wch.cn"),
                device("COM3", "wch.cn"),
            ])
            .unwrap();

        assert_eq!(outcome, ConnectionOutcome::NotFound);
        assert_eq!(log.peak_open("COM3"), 1);
        let com3_opens = log.opens().iter().filter(|(p, _)| p == "COM3").count();
        assert_eq!(com3_opens, 3);
        assert_eq!(log.opens().len(), 6);
    }
}
