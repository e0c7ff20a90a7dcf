//! Native COM plumbing: apartments, `VARIANT` conversion, a real `IDispatch`
//! server over [`DispatchRef`](crate::DispatchRef) and a late-bound client for
//! foreign objects.

mod client;
mod server;
pub mod variant;

use std::marker::PhantomData;

use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};

use crate::error::Result;

pub use client::{ComActivator, NativeObject};
pub use server::ComDispatch;

/// A single-threaded apartment on the current thread, left on drop.
pub struct ComApartment {
    // Apartments are per-thread.
    _not_send: PhantomData<*const ()>,
}

impl ComApartment {
    pub fn enter() -> Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok()? };
        tracing::debug!("COM initialized (STA)");
        Ok(Self {
            _not_send: PhantomData,
        })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
        tracing::debug!("COM uninitialized");
    }
}
