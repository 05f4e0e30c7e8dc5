//! Conversion orchestrator: one RAF in, one JPEG out.
//!
//! A [`Converter`] owns the device handle. [`Converter::begin`] reserves it
//! for a single [`ConversionJob`]; a second request while a job holds the
//! handle fails immediately with [`Error::DeviceBusy`].

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::camera::{self, CameraModel, Capabilities};
use crate::config::{BusyPolicy, ConverterConfig};
use crate::conversion::{ConversionId, ConversionStatus, ObjectHandle, RawConversion};
use crate::error::{Error, JobError};
use crate::events::{ConversionEvent, ConversionObserver, PacketDirection, TracingObserver};
use crate::ptp::{PtpSession, SessionState};
use crate::recipe::{Recipe, RecipeBlob, encode};
use crate::transport::{NusbTransport, TransportError, UsbTransport};

/// Job lifecycle. Linear, with `Aborted` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    SessionOpen,
    RafUploaded,
    RecipeSent,
    ConversionPending,
    ConversionComplete,
    JpegRetrieved,
    SessionClosed,
    Aborted,
}

impl JobState {
    pub fn successor(self) -> Option<JobState> {
        match self {
            JobState::Idle => Some(JobState::SessionOpen),
            JobState::SessionOpen => Some(JobState::RafUploaded),
            JobState::RafUploaded => Some(JobState::RecipeSent),
            JobState::RecipeSent => Some(JobState::ConversionPending),
            JobState::ConversionPending => Some(JobState::ConversionComplete),
            JobState::ConversionComplete => Some(JobState::JpegRetrieved),
            JobState::JpegRetrieved => Some(JobState::SessionClosed),
            JobState::SessionClosed | JobState::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::SessionClosed | JobState::Aborted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "Idle"),
            JobState::SessionOpen => write!(f, "Session Open"),
            JobState::RafUploaded => write!(f, "RAF Uploaded"),
            JobState::RecipeSent => write!(f, "Recipe Sent"),
            JobState::ConversionPending => write!(f, "Conversion Pending"),
            JobState::ConversionComplete => write!(f, "Conversion Complete"),
            JobState::JpegRetrieved => write!(f, "JPEG Retrieved"),
            JobState::SessionClosed => write!(f, "Session Closed"),
            JobState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Cloneable cancellation flag. Waiting on it returns early once cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `duration`. Returns true if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Drives conversions on one camera.
pub struct Converter<T: UsbTransport, O: ConversionObserver = TracingObserver> {
    device: Mutex<T>,
    model: Option<&'static CameraModel>,
    config: ConverterConfig,
    observer: Arc<O>,
}

impl Converter<NusbTransport> {
    /// Open the first supported camera on the bus.
    pub fn open(config: ConverterConfig) -> Result<Self, Error> {
        Ok(Self::new(NusbTransport::open()?, config))
    }
}

impl<T: UsbTransport> Converter<T> {
    /// Create a converter with default tracing observer.
    pub fn new(transport: T, config: ConverterConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: UsbTransport, O: ConversionObserver> Converter<T, O> {
    /// Create a converter with a custom observer.
    pub fn with_observer(transport: T, config: ConverterConfig, observer: Arc<O>) -> Self {
        let model = camera::lookup(transport.vendor_id(), transport.product_id());
        if model.is_none() {
            warn!(
                vid = %format!("{:04X}", transport.vendor_id()),
                pid = %format!("{:04X}", transport.product_id()),
                "Unknown camera body, using standard recipe ranges"
            );
        }
        Self {
            device: Mutex::new(transport),
            model,
            config,
            observer,
        }
    }

    pub fn model(&self) -> Option<&'static CameraModel> {
        self.model
    }

    pub fn capabilities(&self) -> Capabilities {
        self.model.map(|m| m.capabilities).unwrap_or_default()
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Release the device handle.
    pub fn into_transport(self) -> T {
        self.device
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self) -> Result<MutexGuard<'_, T>, Error> {
        match self.device.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(Error::DeviceBusy),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }

    /// Reserve the device for one job. No I/O happens here: a busy handle
    /// or a recipe the body cannot accept fails before any transfer.
    pub fn begin<'c>(
        &'c self,
        raf: &'c [u8],
        recipe: &Recipe,
    ) -> Result<ConversionJob<'c, T, O>, Error> {
        let device = self.reserve()?;
        recipe.validate_for(&self.capabilities())?;
        Ok(ConversionJob {
            device,
            config: &self.config,
            observer: self.observer.as_ref(),
            raf,
            blob: encode(recipe),
        })
    }

    /// Run one conversion to completion.
    pub fn convert(
        &self,
        raf: &[u8],
        recipe: &Recipe,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, JobError> {
        self.begin(raf, recipe)?.run(cancel)
    }

    /// Read the camera's current conversion profile.
    pub fn read_profile(&self) -> Result<Vec<u8>, Error> {
        let device = self.reserve()?;
        let transport = ObservableTransport {
            inner: &*device,
            observer: self.observer.as_ref(),
        };
        let mut ext = RawConversion::new(
            PtpSession::new(&transport, self.config.session_options()),
            self.config.opcodes,
        );
        let busy = &self.config.busy;
        let observer = self.observer.as_ref();
        let pause = |delay: Duration| {
            std::thread::sleep(delay);
            false
        };

        let session_id = self.config.session_id;
        retry_busy(busy, observer, "OpenSession", pause, || ext.open_session(session_id))?;
        let profile = retry_busy(busy, observer, "GetDeviceInfo", pause, || ext.device_info())
            .and_then(|_| {
                retry_busy(busy, observer, "GetDevicePropValue", pause, || {
                    ext.read_profile()
                })
            });
        if let Err(e) = ext.close() {
            warn!(error = %e, "CloseSession failed");
        }
        profile
    }
}

/// An in-flight conversion holding the device exclusively.
pub struct ConversionJob<'c, T: UsbTransport, O: ConversionObserver> {
    device: MutexGuard<'c, T>,
    config: &'c ConverterConfig,
    observer: &'c O,
    raf: &'c [u8],
    blob: RecipeBlob,
}

impl<'c, T: UsbTransport, O: ConversionObserver> ConversionJob<'c, T, O> {
    /// Encoded recipe that will be sent.
    pub fn blob(&self) -> &RecipeBlob {
        &self.blob
    }

    /// Drive the job. On failure the uploaded and produced objects are
    /// deleted and the session closed, best-effort, before returning.
    #[instrument(skip_all, fields(raf_bytes = self.raf.len()))]
    pub fn run(self, cancel: &CancelToken) -> Result<Vec<u8>, JobError> {
        let ConversionJob {
            device,
            config,
            observer,
            raf,
            blob,
        } = self;

        let transport = ObservableTransport {
            inner: &*device,
            observer,
        };
        let mut ext = RawConversion::new(
            PtpSession::new(&transport, config.session_options()),
            config.opcodes,
        );
        let mut job = Job {
            config,
            observer,
            cancel,
            progress: Progress::new(observer),
            objects: Objects::default(),
        };

        match job.drive(&mut ext, raf, &blob) {
            Ok(jpeg) => {
                let failures = cleanup(&mut ext, &job.objects, &config.busy, observer);
                if !failures.is_empty() {
                    warn!(count = failures.len(), "Conversion succeeded but cleanup did not");
                }
                job.progress.advance(JobState::SessionClosed);
                Ok(jpeg)
            }
            Err(source) => {
                let state = job.progress.state;
                warn!(state = %state, error = %source, "Conversion aborted");
                job.progress.abort();
                let cleanup = cleanup(&mut ext, &job.objects, &config.busy, observer);
                Err(JobError {
                    state,
                    source,
                    cleanup,
                })
            }
        }
    }
}

/// State tracking with observer notification.
struct Progress<'o, O: ConversionObserver> {
    state: JobState,
    observer: &'o O,
}

impl<'o, O: ConversionObserver> Progress<'o, O> {
    fn new(observer: &'o O) -> Self {
        Self {
            state: JobState::Idle,
            observer,
        }
    }

    fn advance(&mut self, to: JobState) {
        debug_assert_eq!(self.state.successor(), Some(to), "invalid job transition");
        self.transition(to);
    }

    fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.transition(JobState::Aborted);
        }
    }

    fn transition(&mut self, to: JobState) {
        let from = std::mem::replace(&mut self.state, to);
        self.observer
            .on_event(&ConversionEvent::StateChanged { from, to });
    }
}

/// Objects created on the camera by this job.
#[derive(Debug, Default)]
struct Objects {
    raf: Option<ObjectHandle>,
    jpeg: Option<ObjectHandle>,
}

struct Job<'a, O: ConversionObserver> {
    config: &'a ConverterConfig,
    observer: &'a O,
    cancel: &'a CancelToken,
    progress: Progress<'a, O>,
    objects: Objects,
}

impl<O: ConversionObserver> Job<'_, O> {
    fn drive<U: UsbTransport>(
        &mut self,
        ext: &mut RawConversion<'_, U>,
        raf: &[u8],
        blob: &RecipeBlob,
    ) -> Result<Vec<u8>, Error> {
        self.check_cancel()?;

        let session_id = self.config.session_id;
        self.with_retry("OpenSession", || ext.open_session(session_id))?;
        let info = self.with_retry("GetDeviceInfo", || ext.device_info())?;
        self.observer.on_event(&ConversionEvent::DeviceOpened {
            model: info.model.clone(),
            firmware: info.device_version.clone(),
        });
        self.progress.advance(JobState::SessionOpen);

        self.check_cancel()?;
        let source = self.with_retry("SendObjectInfo", || ext.send_object_info(raf.len()))?;
        // The camera owns an object from here on, whatever happens to the payload.
        self.objects.raf = Some(source);
        self.with_retry("SendObject", || ext.send_object(source, raf))?;
        self.progress.advance(JobState::RafUploaded);

        self.check_cancel()?;
        let id = self.with_retry("StartConversion", || ext.start_conversion(source, blob))?;
        self.progress.advance(JobState::RecipeSent);

        self.progress.advance(JobState::ConversionPending);
        let result = self.poll_until_done(ext, id)?;
        self.objects.jpeg = Some(result);
        self.progress.advance(JobState::ConversionComplete);

        let jpeg = self.with_retry("GetObject", || ext.retrieve_object(result))?;
        self.progress.advance(JobState::JpegRetrieved);
        self.observer
            .on_event(&ConversionEvent::Complete { bytes: jpeg.len() });
        Ok(jpeg)
    }

    fn check_cancel(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn with_retry<R>(
        &self,
        operation: &'static str,
        op: impl FnMut() -> Result<R, Error>,
    ) -> Result<R, Error> {
        retry_busy(
            &self.config.busy,
            self.observer,
            operation,
            |delay| self.cancel.sleep(delay),
            op,
        )
    }

    fn poll_until_done<U: UsbTransport>(
        &self,
        ext: &mut RawConversion<'_, U>,
        id: ConversionId,
    ) -> Result<ObjectHandle, Error> {
        let policy = &self.config.poll;
        let max_wait = Duration::from_millis(policy.max_wait_ms);
        let mut interval = Duration::from_millis(policy.interval_ms);
        let start = Instant::now();
        let mut attempt = 0;
        let mut busy = 0;

        loop {
            self.check_cancel()?;
            attempt += 1;

            let wait = match ext.poll_status(id) {
                Ok(status) => {
                    busy = 0;
                    self.observer.on_event(&ConversionEvent::Poll {
                        attempt,
                        status,
                        elapsed: start.elapsed(),
                    });
                    match status {
                        ConversionStatus::Complete(handle) => {
                            info!(handle = %handle, polls = attempt, "Conversion finished");
                            return Ok(handle);
                        }
                        ConversionStatus::Failed(code) => {
                            return Err(Error::ConversionFailed { code });
                        }
                        ConversionStatus::Pending | ConversionStatus::InProgress => {
                            let wait = interval;
                            interval = policy.next_interval(interval);
                            wait
                        }
                    }
                }
                Err(Error::DeviceBusy) => {
                    busy += 1;
                    if busy >= self.config.busy.max_attempts {
                        return Err(Error::DeviceBusy);
                    }
                    let delay = self.config.busy.delay(busy);
                    self.observer.on_event(&ConversionEvent::BusyRetry {
                        operation: "GetConversionStatus",
                        attempt: busy,
                        delay,
                    });
                    delay
                }
                Err(e) => return Err(e),
            };

            let elapsed = start.elapsed();
            if elapsed >= max_wait {
                return Err(Error::PollTimeout {
                    waited_ms: elapsed.as_millis() as u64,
                });
            }
            if self.cancel.sleep(wait.min(max_wait - elapsed)) {
                return Err(Error::Cancelled);
            }
        }
    }
}

/// Repeat `op` while the camera answers busy, up to the configured number
/// of consecutive busy answers. `wait` sleeps between attempts and returns
/// true to give up early.
fn retry_busy<R, O: ConversionObserver>(
    policy: &BusyPolicy,
    observer: &O,
    operation: &'static str,
    wait: impl Fn(Duration) -> bool,
    mut op: impl FnMut() -> Result<R, Error>,
) -> Result<R, Error> {
    let mut busy = 0;
    loop {
        match op() {
            Err(Error::DeviceBusy) => {
                busy += 1;
                if busy >= policy.max_attempts {
                    warn!(operation, attempts = busy, "Camera still busy, giving up");
                    return Err(Error::DeviceBusy);
                }
                let delay = policy.delay(busy);
                observer.on_event(&ConversionEvent::BusyRetry {
                    operation,
                    attempt: busy,
                    delay,
                });
                if wait(delay) {
                    return Err(Error::Cancelled);
                }
            }
            other => return other,
        }
    }
}

/// Delete what the job left on the camera and close the session. Failures
/// are logged and returned, never raised. Runs even after cancellation.
fn cleanup<U: UsbTransport, O: ConversionObserver>(
    ext: &mut RawConversion<'_, U>,
    objects: &Objects,
    policy: &BusyPolicy,
    observer: &O,
) -> Vec<Error> {
    let mut failures = Vec::new();
    let mut record = |step: &'static str, error: Error| {
        warn!(step, error = %error, "Cleanup step failed");
        observer.on_event(&ConversionEvent::CleanupFailed {
            step,
            error: error.to_string(),
        });
        failures.push(error);
    };
    let pause = |delay: Duration| {
        std::thread::sleep(delay);
        false
    };

    if ext.session().state() == SessionState::Open {
        for (step, handle) in [("DeleteObject(RAF)", objects.raf), ("DeleteObject(JPEG)", objects.jpeg)] {
            if let Some(handle) = handle
                && let Err(e) = retry_busy(policy, observer, step, pause, || ext.delete_object(handle))
            {
                record(step, e);
            }
        }
    }
    if ext.session().state() != SessionState::Closed
        && let Err(e) = ext.close()
    {
        record("CloseSession", e);
    }
    failures
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: UsbTransport + ?Sized, O: ConversionObserver> {
    inner: &'a T,
    observer: &'a O,
}

impl<T: UsbTransport + ?Sized, O: ConversionObserver> ObservableTransport<'_, T, O> {
    fn emit(&self, direction: PacketDirection, data: &[u8]) {
        self.observer.on_event(&ConversionEvent::Packet {
            direction,
            length: data.len(),
            head: data.iter().take(32).cloned().collect(),
        });
    }
}

impl<T: UsbTransport + ?Sized, O: ConversionObserver> UsbTransport for ObservableTransport<'_, T, O> {
    fn bulk_write(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let res = self.inner.bulk_write(data, timeout);
        if res.is_ok() {
            self.emit(PacketDirection::Tx, data);
        }
        res
    }

    fn bulk_read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.bulk_read(max_len, timeout);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.emit(PacketDirection::Rx, data);
        }
        res
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}
