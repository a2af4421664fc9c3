//! Thread-local code-resolution context
//!
//! Each generation's threads carry the [`OverlayImage`] they were launched
//! with. Application code resolves modules through [`lookup`] and spawns
//! helper threads with [`spawn`] so they see the same generation.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::module::Content;
use crate::overlay::OverlayImage;

thread_local! {
    static CURRENT_IMAGE: RefCell<Option<Arc<OverlayImage>>> = const { RefCell::new(None) };
}

/// Restores the previously bound image when dropped
#[must_use = "the image is unbound as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<Arc<OverlayImage>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_IMAGE.with(|current| *current.borrow_mut() = previous);
    }
}

/// Bind `image` to the calling thread until the guard is dropped.
pub fn enter(image: Arc<OverlayImage>) -> ContextGuard {
    let previous = CURRENT_IMAGE.with(|current| current.borrow_mut().replace(image));
    ContextGuard { previous }
}

/// Image bound to the calling thread, if any
pub fn current() -> Option<Arc<OverlayImage>> {
    CURRENT_IMAGE.with(|current| current.borrow().clone())
}

/// Generation of the image bound to the calling thread
pub fn generation() -> Option<u64> {
    CURRENT_IMAGE.with(|current| current.borrow().as_ref().map(|image| image.generation()))
}

/// Resolve `name` through the calling thread's image.
pub fn lookup(name: &str) -> Option<Content> {
    CURRENT_IMAGE.with(|current| current.borrow().as_ref().and_then(|image| image.lookup(name)))
}

/// Spawn a thread that inherits the calling thread's image.
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let image = current();
    std::thread::spawn(move || {
        let _guard = image.map(enter);
        f()
    })
}
