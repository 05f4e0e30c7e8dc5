//! Rawji-Core: Fujifilm in-camera RAW conversion over USB.
//!
//! A supported body in "USB RAW CONV." mode accepts a RAF file and a
//! conversion recipe, develops the image with its own processor and hands
//! back a JPEG. This crate drives that exchange.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: USB bulk communication abstraction (nusb, mock)
//! - **PTP**: Container codec, datasets and a transaction-ordered session
//! - **Conversion**: Fujifilm vendor operations for upload, conversion and retrieval
//! - **Recipe**: Typed recipe model and the 628-byte binary codec
//! - **Events**: Observer pattern for UI decoupling
//! - **Orchestrator**: One device, one job at a time, with cleanup on failure
//!
//! # Example
//!
//! ```no_run
//! use rawji_core::{CancelToken, Converter, ConverterConfig, FilmSimulation, RecipeBuilder};
//!
//! let recipe = RecipeBuilder::new()
//!     .film_simulation(FilmSimulation::ClassicChrome)
//!     .exposure(0.33)
//!     .build()?;
//!
//! let converter = Converter::open(ConverterConfig::default())?;
//! let raf = std::fs::read("DSCF0001.RAF")?;
//! let jpeg = converter.convert(&raf, &recipe, &CancelToken::new())?;
//! std::fs::write("DSCF0001.JPG", jpeg)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod camera;
pub mod config;
pub mod conversion;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod ptp;
pub mod recipe;
pub mod transport;

// Re-exports for convenience
pub use camera::{CameraModel, Capabilities, SUPPORTED_CAMERAS};
pub use config::{Backoff, BusyPolicy, ConverterConfig, PollPolicy};
pub use conversion::{ConversionId, ConversionStatus, ObjectHandle, RawConversion, VendorOpcodes};
pub use error::{Error, JobError, Result};
pub use events::{
    ConversionEvent, ConversionObserver, NullObserver, PacketDirection, TracingObserver,
};
pub use orchestrator::{CancelToken, ConversionJob, Converter, JobState};
pub use ptp::{PtpSession, SessionOptions, SessionState};
pub use recipe::{
    DynamicRange, EffectStrength, ExposureBias, FilmSimulation, GrainSize, ImageQuality,
    ImageSize, Recipe, RecipeBlob, RecipeBuilder, ValidationError, WhiteBalance,
};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
