use std::sync::OnceLock;

/// Opaque value selecting which network stack instance a socket targets.
///
/// Threaded explicitly through `open()` rather than read from process
/// state, so every socket's binding is visible at its creation site.
/// Platforms with a single stack use [`NetworkStackId::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStackId(pub u32);

impl NetworkStackId {
	pub const DEFAULT: Self = Self(0);

	/// Narrow adapter for deployments that still select the stack via
	/// the process environment (`SOCKLANE_NETWORK_STACK`). The variable
	/// is read once; later changes to the environment are ignored.
	pub fn from_environment() -> Self {
		static CACHED: OnceLock<NetworkStackId> = OnceLock::new();
		*CACHED.get_or_init(|| {
			match std::env::var("SOCKLANE_NETWORK_STACK") {
				Ok(raw) => match raw.parse::<u32>() {
					Ok(id) => NetworkStackId(id),
					Err(_) => {
						log::warn!("ignoring malformed SOCKLANE_NETWORK_STACK={raw:?}");
						NetworkStackId::DEFAULT
					}
				},
				Err(_) => NetworkStackId::DEFAULT,
			}
		})
	}
}

impl Default for NetworkStackId {
	fn default() -> Self {
		Self::DEFAULT
	}
}
