//! Virtual screen layout domain entity.
//!
//! The layout maintains a unified 2D coordinate space ("virtual screen space")
//! where all screens are positioned. The master screen is anchored at (0, 0)
//! and is not part of the editable entry table. Clients are positioned
//! relative to the master using their `x_offset` / `y_offset`.
//!
//! A committed layout always satisfies:
//!
//! - no two rectangles (master included) share any area; touching edges are fine,
//! - every entry has a strictly positive width and height,
//! - every entry can be reached from the master by crossing shared edges,
//! - each client appears at most once.
//!
//! [`VirtualLayout::replace_all`] checks a whole candidate before touching the
//! committed table, so a rejected candidate leaves the previous layout intact.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for a client, derived from UUID v4.
pub type ClientId = Uuid;

/// Identifies a screen (either master or a specific client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScreenId {
    Master,
    Client(ClientId),
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenId::Master => f.write_str("master"),
            ScreenId::Client(id) => write!(f, "client {id}"),
        }
    }
}

/// Errors that can occur when validating a candidate layout.
///
/// Variants are listed in the order the checks run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// Two screen regions overlap in virtual space.
    #[error("screen regions overlap: {0} and {1}")]
    Overlap(ScreenId, ScreenId),

    /// An entry references a client the registry does not know.
    #[error("client not found: {0}")]
    ClientNotFound(ClientId),

    /// The same client appears in more than one entry.
    #[error("client appears more than once in the layout: {0}")]
    DuplicateClient(ClientId),

    /// An entry has a zero width or height.
    #[error("screen of client {0} must have a positive width and height")]
    InvalidDimensions(ClientId),

    /// An entry shares no edge with any screen connected to the master.
    #[error("screen of client {0} is unreachable from the master screen")]
    Unreachable(ClientId),
}

/// A rectangular region in the virtual screen coordinate system.
///
/// `virtual_x` and `virtual_y` are the top-left corner coordinates in virtual space.
/// The master screen is always at (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRegion {
    /// X coordinate of the top-left corner in virtual space (may be negative).
    pub virtual_x: i32,
    /// Y coordinate of the top-left corner in virtual space (may be negative).
    pub virtual_y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ScreenRegion {
    /// Returns the rightmost X coordinate (exclusive).
    pub fn right(&self) -> i64 {
        i64::from(self.virtual_x) + i64::from(self.width)
    }

    /// Returns the bottommost Y coordinate (exclusive).
    pub fn bottom(&self) -> i64 {
        i64::from(self.virtual_y) + i64::from(self.height)
    }

    /// Returns `true` if this region overlaps with `other`.
    ///
    /// Half-open intervals: regions that only share a boundary do not overlap.
    pub fn overlaps(&self, other: &ScreenRegion) -> bool {
        ranges_overlap(i64::from(self.virtual_x), self.right(), i64::from(other.virtual_x), other.right())
            && ranges_overlap(i64::from(self.virtual_y), self.bottom(), i64::from(other.virtual_y), other.bottom())
    }

    /// Returns `true` if the point lies inside this region (right/bottom exclusive).
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        x >= i64::from(self.virtual_x) && x < self.right() && y >= i64::from(self.virtual_y) && y < self.bottom()
    }

    /// Returns `true` if the two regions share a boundary segment of positive length.
    ///
    /// Screens that meet only at a corner point are not adjacent: the cursor
    /// cannot cross from one to the other.
    pub fn touches(&self, other: &ScreenRegion) -> bool {
        let vertical_seam = self.right() == i64::from(other.virtual_x) || other.right() == i64::from(self.virtual_x);
        let horizontal_seam = self.bottom() == i64::from(other.virtual_y) || other.bottom() == i64::from(self.virtual_y);

        (vertical_seam
            && ranges_overlap(i64::from(self.virtual_y), self.bottom(), i64::from(other.virtual_y), other.bottom()))
            || (horizontal_seam
                && ranges_overlap(i64::from(self.virtual_x), self.right(), i64::from(other.virtual_x), other.right()))
    }
}

/// A client screen positioned relative to the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutEntry {
    /// UUID identifying the client.
    pub client_id: ClientId,
    /// Horizontal offset in pixels relative to the master's top-left corner.
    pub x_offset: i32,
    /// Vertical offset in pixels relative to the master's top-left corner.
    pub y_offset: i32,
    /// Client screen width in pixels.
    pub width: u32,
    /// Client screen height in pixels.
    pub height: u32,
}

impl LayoutEntry {
    /// The rectangle this entry occupies in virtual space.
    pub fn region(&self) -> ScreenRegion {
        ScreenRegion {
            virtual_x: self.x_offset,
            virtual_y: self.y_offset,
            width: self.width,
            height: self.height,
        }
    }
}

/// The virtual screen layout.
///
/// Holds the fixed master rectangle and the committed client entries, ordered
/// by client ID so repeated reads are diff-stable.
#[derive(Debug, Clone)]
pub struct VirtualLayout {
    master: ScreenRegion,
    entries: BTreeMap<ClientId, LayoutEntry>,
}

impl VirtualLayout {
    /// Creates an empty layout with the master screen at (0, 0).
    pub fn new(master_width: u32, master_height: u32) -> Self {
        Self {
            master: ScreenRegion {
                virtual_x: 0,
                virtual_y: 0,
                width: master_width,
                height: master_height,
            },
            entries: BTreeMap::new(),
        }
    }

    /// The master screen region (always at virtual_x=0, virtual_y=0).
    pub fn master(&self) -> &ScreenRegion {
        &self.master
    }

    /// Returns the committed entries in ascending client-ID order.
    pub fn entries(&self) -> Vec<LayoutEntry> {
        self.entries.values().copied().collect()
    }

    /// Returns the committed entry for `client_id`, if any.
    pub fn entry(&self, client_id: ClientId) -> Option<&LayoutEntry> {
        self.entries.get(&client_id)
    }

    /// Returns all client IDs referenced by the layout.
    pub fn client_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks a candidate layout without committing it.
    ///
    /// `is_known` answers whether a client ID exists in the registry.
    ///
    /// # Errors
    ///
    /// Returns the first [`LayoutError`] found, checking in this order:
    /// overlap, unknown or duplicate client, non-positive size, reachability.
    pub fn validate<F>(&self, candidate: &[LayoutEntry], is_known: F) -> Result<(), LayoutError>
    where
        F: Fn(&ClientId) -> bool,
    {
        // 1. Overlap, master included.
        for (i, entry) in candidate.iter().enumerate() {
            let region = entry.region();
            if region.overlaps(&self.master) {
                return Err(LayoutError::Overlap(ScreenId::Master, ScreenId::Client(entry.client_id)));
            }
            for other in &candidate[i + 1..] {
                if region.overlaps(&other.region()) {
                    return Err(LayoutError::Overlap(
                        ScreenId::Client(entry.client_id),
                        ScreenId::Client(other.client_id),
                    ));
                }
            }
        }

        // 2. Every entry references a known client, once.
        let mut seen = HashSet::with_capacity(candidate.len());
        for entry in candidate {
            if !is_known(&entry.client_id) {
                return Err(LayoutError::ClientNotFound(entry.client_id));
            }
            if !seen.insert(entry.client_id) {
                return Err(LayoutError::DuplicateClient(entry.client_id));
            }
        }

        // 3. Strictly positive dimensions.
        if let Some(entry) = candidate.iter().find(|e| e.width == 0 || e.height == 0) {
            return Err(LayoutError::InvalidDimensions(entry.client_id));
        }

        // 4. Reachable from the master through shared edges.
        if let Some(island) = self.first_unreachable(candidate) {
            return Err(LayoutError::Unreachable(island));
        }

        Ok(())
    }

    /// Validates `candidate` and, only if it is valid, replaces the whole
    /// entry table with it.
    ///
    /// # Errors
    ///
    /// Returns the validation error; the committed layout is untouched.
    pub fn replace_all<F>(&mut self, candidate: Vec<LayoutEntry>, is_known: F) -> Result<(), LayoutError>
    where
        F: Fn(&ClientId) -> bool,
    {
        self.validate(&candidate, is_known)?;
        self.entries = candidate.into_iter().map(|e| (e.client_id, e)).collect();
        debug!(entries = self.entries.len(), "layout replaced");
        Ok(())
    }

    /// Removes the entry for a client.  Returns `true` if one existed.
    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        self.entries.remove(&client_id).is_some()
    }

    /// Returns the client whose screen contains the virtual point, if any.
    ///
    /// Points on the master screen, and points outside every screen, resolve
    /// to `None`: input stays local.  A linear scan is fine for the handful of
    /// screens a KVM setup has.
    pub fn resolve_client_at(&self, virtual_x: i32, virtual_y: i32) -> Option<ClientId> {
        if self.master.contains(virtual_x, virtual_y) {
            return None;
        }
        self.entries
            .values()
            .find(|e| e.region().contains(virtual_x, virtual_y))
            .map(|e| e.client_id)
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Breadth-first search over the edge-adjacency graph rooted at the master.
    fn first_unreachable(&self, candidate: &[LayoutEntry]) -> Option<ClientId> {
        let regions: Vec<ScreenRegion> = candidate.iter().map(LayoutEntry::region).collect();
        let mut reached = vec![false; regions.len()];
        let mut queue = VecDeque::new();

        for (i, region) in regions.iter().enumerate() {
            if region.touches(&self.master) {
                reached[i] = true;
                queue.push_back(i);
            }
        }
        while let Some(current) = queue.pop_front() {
            for (i, region) in regions.iter().enumerate() {
                if !reached[i] && region.touches(&regions[current]) {
                    reached[i] = true;
                    queue.push_back(i);
                }
            }
        }

        reached
            .iter()
            .position(|r| !r)
            .map(|i| candidate[i].client_id)
    }
}

/// Returns `true` if the two 1-D intervals `[a_start, a_end)` and `[b_start, b_end)` overlap.
fn ranges_overlap(a_start: i64, a_end: i64, b_start: i64, b_end: i64) -> bool {
    a_start < b_end && b_start < a_end
}

// ── Tests ─────────────────────────────────────────────────────────────────────
