//! Viewport texture-alpha handling for key/fill output.
//!
//! Key/fill needs the rendered alpha channel, so a viewport configured to
//! ignore texture alpha is switched over for the lifetime of the session and
//! switched back when the session ends or the viewport is replaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// The render viewport being captured.
pub trait Viewport: Send + Sync {
    fn ignore_texture_alpha(&self) -> bool;

    fn set_ignore_texture_alpha(&self, ignore: bool);
}

/// Plain viewport holding only the alpha flag.
#[derive(Debug, Default)]
pub struct SceneViewport {
    ignore_alpha: AtomicBool,
}

impl SceneViewport {
    pub fn new(ignore_texture_alpha: bool) -> Self {
        Self {
            ignore_alpha: AtomicBool::new(ignore_texture_alpha),
        }
    }
}

impl Viewport for SceneViewport {
    fn ignore_texture_alpha(&self) -> bool {
        self.ignore_alpha.load(Ordering::SeqCst)
    }

    fn set_ignore_texture_alpha(&self, ignore: bool) {
        self.ignore_alpha.store(ignore, Ordering::SeqCst);
    }
}

/// A viewport bound to a running session, remembering what to restore.
pub(crate) struct ViewportBinding {
    viewport: Arc<dyn Viewport>,
    saved_ignore_alpha: bool,
    changed: bool,
}

impl ViewportBinding {
    /// Save the viewport's flag and enable alpha when key output is used.
    pub(crate) fn apply(viewport: Arc<dyn Viewport>, uses_key: bool) -> Self {
        let saved_ignore_alpha = viewport.ignore_texture_alpha();
        let changed = uses_key && saved_ignore_alpha;
        if changed {
            debug!("Enabling viewport texture alpha for key output");
            viewport.set_ignore_texture_alpha(false);
        }
        Self {
            viewport,
            saved_ignore_alpha,
            changed,
        }
    }

    /// Put the saved flag back, if it was touched.
    pub(crate) fn restore(self) {
        if self.changed {
            debug!(
                "Restoring viewport ignore-texture-alpha to {}",
                self.saved_ignore_alpha
            );
            self.viewport
                .set_ignore_texture_alpha(self.saved_ignore_alpha);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_output_enables_alpha_and_restores() {
        let viewport = Arc::new(SceneViewport::new(true));
        let binding = ViewportBinding::apply(viewport.clone(), true);
        assert!(!viewport.ignore_texture_alpha());

        binding.restore();
        assert!(viewport.ignore_texture_alpha());
    }

    #[test]
    fn test_fill_only_leaves_viewport_alone() {
        let viewport = Arc::new(SceneViewport::new(true));
        let binding = ViewportBinding::apply(viewport.clone(), false);
        assert!(viewport.ignore_texture_alpha());

        // A change made by someone else during the session is not undone.
        viewport.set_ignore_texture_alpha(false);
        binding.restore();
        assert!(!viewport.ignore_texture_alpha());
    }

    #[test]
    fn test_alpha_already_enabled() {
        let viewport = Arc::new(SceneViewport::new(false));
        let binding = ViewportBinding::apply(viewport.clone(), true);
        assert!(!viewport.ignore_texture_alpha());
        binding.restore();
        assert!(!viewport.ignore_texture_alpha());
    }
}
