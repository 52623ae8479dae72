//! Error taxonomy for the connection controller.

use thiserror::Error;

/// Failures that can escape the library boundary.
///
/// Only [`Error::AdapterUnavailable`] is fatal to a controller; every other
/// failure kind (scan misses, refused connections, command timeouts) is
/// absorbed by the retry layer and surfaces as an empty result instead.
#[derive(Debug, Error)]
pub enum Error {
	/// No usable USB Bluetooth adapter, or the adapter could not be activated.
	#[error("no usable USB Bluetooth adapter: {0}")]
	AdapterUnavailable(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
