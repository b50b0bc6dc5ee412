//! The device camera as a single exclusive resource.
//!
//! Only one live pipeline may hold the camera at a time. Binding while another
//! binding exists fails with `ResourceBindingConflict`; callers must unbind
//! first. `unbind_all` force-releases whatever is currently bound.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::error::{DetectError, DetectResult};

use super::live::{Capture, LiveStream};
use super::slot::SlotSender;

static SHARED: OnceLock<Arc<CameraProvider>> = OnceLock::new();

#[derive(Default)]
pub struct CameraProvider {
    active: Mutex<Option<ActiveBinding>>,
}

struct ActiveBinding {
    owner: u64,
    generation: u64,
    capture: Capture,
}

impl CameraProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide camera.
    pub fn shared() -> Arc<CameraProvider> {
        SHARED.get_or_init(|| Arc::new(CameraProvider::new())).clone()
    }

    /// Bind `stream` to the camera for `owner`, delivering frames into `sink`.
    pub fn bind(
        self: &Arc<Self>,
        owner: u64,
        stream: &LiveStream,
        sink: SlotSender,
    ) -> DetectResult<CameraBinding> {
        let mut active = self.lock();
        if let Some(current) = active.as_ref() {
            return Err(DetectError::ResourceBindingConflict {
                holder: current.owner,
            });
        }
        let capture = stream.attach(sink)?;
        let generation = next_generation();
        *active = Some(ActiveBinding {
            owner,
            generation,
            capture,
        });
        log::info!(
            "CameraProvider: bound {} to pipeline #{}",
            stream.describe(),
            owner
        );
        Ok(CameraBinding {
            provider: self.clone(),
            owner,
            generation,
            released: false,
        })
    }

    /// Release the current binding, whoever holds it.
    pub fn unbind_all(&self) {
        let released = self.lock().take();
        if let Some(mut binding) = released {
            binding.capture.stop();
            log::info!("CameraProvider: force-released pipeline #{}", binding.owner);
        }
    }

    /// Owner of the current binding, if any.
    pub fn holder(&self) -> Option<u64> {
        self.lock().as_ref().map(|b| b.owner)
    }

    pub fn is_bound(&self) -> bool {
        self.holder().is_some()
    }

    fn release(&self, generation: u64) -> bool {
        let released = {
            let mut active = self.lock();
            match active.as_ref() {
                Some(current) if current.generation == generation => active.take(),
                _ => None,
            }
        };
        match released {
            Some(mut binding) => {
                // Joining the capture thread happens outside the lock.
                binding.capture.stop();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveBinding>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn next_generation() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Proof of camera ownership. Releases the camera on `unbind()` or drop.
pub struct CameraBinding {
    provider: Arc<CameraProvider>,
    owner: u64,
    generation: u64,
    released: bool,
}

impl CameraBinding {
    pub fn owner(&self) -> u64 {
        self.owner
    }

    /// Stop capture and free the camera. Idempotent; a binding that was already
    /// force-released by `unbind_all` is left alone.
    pub fn unbind(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.provider.release(self.generation) {
            log::info!("CameraProvider: pipeline #{} unbound", self.owner);
        }
    }
}

impl Drop for CameraBinding {
    fn drop(&mut self) {
        self.unbind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::slot::frame_slot;

    #[test]
    fn second_bind_conflicts_until_unbind() {
        let camera = Arc::new(CameraProvider::new());
        let (stream, _pusher) = LiveStream::manual();
        let (tx, _rx) = frame_slot();
        let mut first = camera.bind(1, &stream, tx).unwrap();

        let (other, _other_pusher) = LiveStream::manual();
        let (tx2, _rx2) = frame_slot();
        let err = camera.bind(2, &other, tx2.clone()).err().unwrap();
        assert!(matches!(err, DetectError::ResourceBindingConflict { holder: 1 }));

        first.unbind();
        first.unbind();
        assert!(!camera.is_bound());
        let second = camera.bind(2, &other, tx2).unwrap();
        assert_eq!(camera.holder(), Some(second.owner()));
    }

    #[test]
    fn unbind_all_detaches_pusher() {
        let camera = Arc::new(CameraProvider::new());
        let (stream, pusher) = LiveStream::manual();
        let (tx, _rx) = frame_slot();
        let mut binding = camera.bind(7, &stream, tx).unwrap();
        assert!(pusher.is_bound());

        camera.unbind_all();
        assert!(!pusher.is_bound());
        assert!(!camera.is_bound());

        // A stale binding must not release a newer one.
        let (tx, _rx) = frame_slot();
        let _newer = camera.bind(8, &stream, tx).unwrap();
        binding.unbind();
        assert_eq!(camera.holder(), Some(8));
    }
}
