//! UpdateLayoutUseCase: validates and applies layout changes.
//!
//! The [`LayoutEngine`] owns the master's [`VirtualLayout`] and is the only
//! way the rest of the application changes it.  Every change goes through
//! [`LayoutEngine::replace_all`], which checks the whole candidate against the
//! current [`ClientRegistry`] before anything is committed.
//!
//! # Why whole-layout replacement? (for beginners)
//!
//! The drag-and-drop editor sends the complete arrangement every time the
//! user drops a screen.  Validating the full candidate means a single bad
//! position (an overlap, a screen floating off on its own) rejects the whole
//! edit and the previously applied layout stays exactly as it was.  There is
//! no half-applied state for the router to observe.
//!
//! # Consistency with the registry
//!
//! Every layout entry must reference a client the registry knows.  When a
//! client is removed from the registry, [`LayoutEngine::prune`] drops its
//! entry.  [`LayoutEngine::verify_consistency`] reports a layout that has
//! drifted out of sync as an internal error instead of silently serving it.

use kvm_core::{ClientId, LayoutEntry, LayoutError, VirtualLayout};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::manage_clients::ClientRegistry;

/// Error type for layout update operations.
#[derive(Debug, Error, PartialEq)]
pub enum UpdateLayoutError {
    #[error("layout validation failed: {0}")]
    ValidationFailed(#[from] LayoutError),

    /// The layout references a client the registry no longer knows.
    #[error("layout references unknown client {0}")]
    InternalInconsistency(ClientId),
}

/// Owner of the virtual screen layout.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    layout: VirtualLayout,
}

impl LayoutEngine {
    /// Creates an engine with only the master screen, of the given size.
    pub fn new(master_width: u32, master_height: u32) -> Self {
        Self {
            layout: VirtualLayout::new(master_width, master_height),
        }
    }

    /// Returns the current layout entries, ordered by client ID.
    pub fn get(&self) -> Vec<LayoutEntry> {
        self.layout.entries()
    }

    /// Read-only access to the underlying layout.
    pub fn layout(&self) -> &VirtualLayout {
        &self.layout
    }

    /// Validates `candidate` against the registry and, if valid, replaces the
    /// whole layout with it.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateLayoutError::ValidationFailed`] carrying the first
    /// [`LayoutError`] found.  The previous layout is unchanged.
    pub fn replace_all(&mut self, candidate: Vec<LayoutEntry>, registry: &ClientRegistry) -> Result<(), UpdateLayoutError> {
        let count = candidate.len();
        self.layout
            .replace_all(candidate, |id| registry.contains(*id))
            .map_err(|e| {
                warn!(error = %e, "layout update rejected");
                UpdateLayoutError::ValidationFailed(e)
            })?;
        info!(entries = count, "layout updated");
        Ok(())
    }

    /// Returns the client whose screen contains the virtual point, or `None`
    /// when the point is on the master screen or outside every screen.
    pub fn resolve_client_at(&self, virtual_x: i32, virtual_y: i32) -> Option<ClientId> {
        self.layout.resolve_client_at(virtual_x, virtual_y)
    }

    /// Removes the entry for `client_id`.  Returns `true` if there was one.
    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        let removed = self.layout.remove_client(client_id);
        if removed {
            debug!(%client_id, "layout entry removed");
        }
        removed
    }

    /// Drops every entry whose client the registry no longer knows.
    ///
    /// Returns the client IDs that were pruned.
    pub fn prune(&mut self, registry: &ClientRegistry) -> Vec<ClientId> {
        let orphans: Vec<ClientId> = self
            .layout
            .client_ids()
            .filter(|id| !registry.contains(*id))
            .collect();
        for id in &orphans {
            self.layout.remove_client(*id);
        }
        if !orphans.is_empty() {
            info!(count = orphans.len(), "pruned layout entries of removed clients");
        }
        orphans
    }

    /// Checks that every layout entry references a registered client.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateLayoutError::InternalInconsistency`] naming the first
    /// orphaned entry.
    pub fn verify_consistency(&self, registry: &ClientRegistry) -> Result<(), UpdateLayoutError> {
        match self.layout.client_ids().find(|id| !registry.contains(*id)) {
            Some(orphan) => Err(UpdateLayoutError::InternalInconsistency(orphan)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvm_core::ScreenId;
    use uuid::Uuid;

    fn entry(id: ClientId, x: i32, y: i32, w: u32, h: u32) -> LayoutEntry {
        LayoutEntry {
            client_id: id,
            x_offset: x,
            y_offset: y,
            width: w,
            height: h,
        }
    }

    fn registry_with(n: usize) -> (ClientRegistry, Vec<ClientId>) {
        let mut registry = ClientRegistry::new();
        let ids: Vec<ClientId> = (0..n).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            registry.upsert(*id, format!("client-{i}"));
        }
        (registry, ids)
    }

    #[test]
    fn test_new_engine_has_master_only() {
        let engine = LayoutEngine::new(1920, 1080);
        assert!(engine.get().is_empty());
        assert_eq!(engine.layout().master().width, 1920);
    }

    #[test]
    fn test_replace_all_accepts_client_to_the_right_of_master() {
        let (registry, ids) = registry_with(1);
        let mut engine = LayoutEngine::new(1920, 1080);

        let result = engine.replace_all(vec![entry(ids[0], 1920, 0, 1366, 768)], &registry);

        assert!(result.is_ok());
        assert_eq!(engine.resolve_client_at(1920, 0), Some(ids[0]));
        assert_eq!(engine.resolve_client_at(1919, 0), None);
    }

    #[test]
    fn test_replace_all_rejects_overlap_and_keeps_previous_layout() {
        let (registry, ids) = registry_with(2);
        let mut engine = LayoutEngine::new(1920, 1080);
        engine
            .replace_all(vec![entry(ids[0], 1920, 0, 1366, 768)], &registry)
            .unwrap();

        let result = engine.replace_all(
            vec![
                entry(ids[0], 1920, 0, 1920, 1080),
                entry(ids[1], 2000, 0, 1920, 1080),
            ],
            &registry,
        );

        assert_eq!(
            result,
            Err(UpdateLayoutError::ValidationFailed(LayoutError::Overlap(
                ScreenId::Client(ids[0]),
                ScreenId::Client(ids[1]),
            )))
        );
        assert_eq!(engine.get(), vec![entry(ids[0], 1920, 0, 1366, 768)]);
    }

    #[test]
    fn test_replace_all_rejects_unregistered_client() {
        let (registry, _) = registry_with(0);
        let mut engine = LayoutEngine::new(1920, 1080);
        let stranger = Uuid::new_v4();

        let result = engine.replace_all(vec![entry(stranger, 1920, 0, 1920, 1080)], &registry);

        assert_eq!(
            result,
            Err(UpdateLayoutError::ValidationFailed(LayoutError::ClientNotFound(stranger)))
        );
    }

    #[test]
    fn test_replace_all_rejects_unreachable_screen() {
        let (registry, ids) = registry_with(1);
        let mut engine = LayoutEngine::new(1920, 1080);

        let result = engine.replace_all(vec![entry(ids[0], 5000, 5000, 1920, 1080)], &registry);

        assert_eq!(
            result,
            Err(UpdateLayoutError::ValidationFailed(LayoutError::Unreachable(ids[0])))
        );
    }

    #[test]
    fn test_replace_all_with_empty_list_clears_layout() {
        let (registry, ids) = registry_with(1);
        let mut engine = LayoutEngine::new(1920, 1080);
        engine
            .replace_all(vec![entry(ids[0], 1920, 0, 1920, 1080)], &registry)
            .unwrap();

        engine.replace_all(Vec::new(), &registry).unwrap();

        assert!(engine.get().is_empty());
    }

    #[test]
    fn test_prune_removes_entries_of_forgotten_clients() {
        let (mut registry, ids) = registry_with(2);
        let mut engine = LayoutEngine::new(1920, 1080);
        engine
            .replace_all(
                vec![
                    entry(ids[0], 1920, 0, 1920, 1080),
                    entry(ids[1], -1920, 0, 1920, 1080),
                ],
                &registry,
            )
            .unwrap();
        registry.forget(ids[1]).unwrap();

        let pruned = engine.prune(&registry);

        assert_eq!(pruned, vec![ids[1]]);
        assert_eq!(engine.get().len(), 1);
        assert!(engine.verify_consistency(&registry).is_ok());
    }

    #[test]
    fn test_verify_consistency_reports_orphaned_entry() {
        let (mut registry, ids) = registry_with(1);
        let mut engine = LayoutEngine::new(1920, 1080);
        engine
            .replace_all(vec![entry(ids[0], 1920, 0, 1920, 1080)], &registry)
            .unwrap();
        registry.forget(ids[0]).unwrap();

        assert_eq!(
            engine.verify_consistency(&registry),
            Err(UpdateLayoutError::InternalInconsistency(ids[0]))
        );
    }

    #[test]
    fn test_remove_client_reports_whether_entry_existed() {
        let (registry, ids) = registry_with(1);
        let mut engine = LayoutEngine::new(1920, 1080);
        engine
            .replace_all(vec![entry(ids[0], 1920, 0, 1920, 1080)], &registry)
            .unwrap();

        assert!(engine.remove_client(ids[0]));
        assert!(!engine.remove_client(ids[0]));
    }
}
