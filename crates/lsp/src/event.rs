use std::any::{Any, TypeId, type_name};
use std::fmt;

/// A type-erased event delivered to the service through the main loop.
///
/// Events let background tasks hand results back to the service so they are
/// processed in order with notifications, on the loop that owns the service state.
pub struct AnyEvent {
	inner: Box<dyn Any + Send>,
	type_name: &'static str,
}

impl fmt::Debug for AnyEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AnyEvent")
			.field("type_name", &self.type_name)
			.finish_non_exhaustive()
	}
}

impl AnyEvent {
	#[must_use]
	pub(crate) fn new<T: Send + 'static>(v: T) -> Self {
		Self {
			inner: Box::new(v),
			type_name: type_name::<T>(),
		}
	}

	/// The [`TypeId`] of the carried value.
	#[must_use]
	pub fn inner_type_id(&self) -> TypeId {
		// Deref to the trait object, not the box.
		Any::type_id(&*self.inner)
	}

	/// The type name of the carried value, for diagnostics only.
	#[must_use]
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	/// Returns `true` if the carried value is a `T`.
	#[must_use]
	pub fn is<T: Send + 'static>(&self) -> bool {
		self.inner.is::<T>()
	}

	/// Attempts to take the carried value out as a `T`.
	///
	/// # Errors
	///
	/// Returns the event unchanged when it carries another type.
	pub fn downcast<T: Send + 'static>(self) -> Result<T, Self> {
		match self.inner.downcast::<T>() {
			Ok(v) => Ok(*v),
			Err(inner) => Err(Self {
				inner,
				type_name: self.type_name,
			}),
		}
	}
}
