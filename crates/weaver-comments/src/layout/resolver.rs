//! Anchor-to-pixel resolution.
//!
//! Regular content resolves through the host view. Content inside an
//! embedded sub-editor (a code block with its own view) resolves through
//! that editor, in its own coordinate space, and is then shifted by the
//! embedded editor's origin.

use std::collections::HashMap;

use smol_str::SmolStr;

use super::{Measured, Measurement};
use crate::document::{AnchorContext, CommentDocument};
use crate::types::CommentWithPosition;

/// Viewport-relative box around a document position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Coords {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Coords {
    pub fn offset(self, dy: f64, dx: f64) -> Self {
        Self {
            top: self.top + dy,
            bottom: self.bottom + dy,
            left: self.left + dx,
            right: self.right + dx,
        }
    }
}

/// Maps a document position to screen coordinates.
///
/// Returns None when the position is not rendered (folded, virtualised, or
/// the view has not caught up with the document yet).
pub trait AnchorResolver {
    fn coords_at(&self, pos: usize) -> Option<Coords>;
}

/// Resolves through the host view.
pub struct HostDocumentResolver<F> {
    coords_at: F,
}

impl<F> HostDocumentResolver<F>
where
    F: Fn(usize) -> Option<Coords>,
{
    pub fn new(coords_at: F) -> Self {
        Self { coords_at }
    }
}

impl<F> AnchorResolver for HostDocumentResolver<F>
where
    F: Fn(usize) -> Option<Coords>,
{
    fn coords_at(&self, pos: usize) -> Option<Coords> {
        (self.coords_at)(pos)
    }
}

/// Resolves through an embedded editor whose positions start at
/// `region_start` in the host document.
pub struct EmbeddedRegionResolver<F> {
    region_start: usize,
    /// Where the embedded editor's own (0, 0) sits on screen.
    origin: (f64, f64),
    coords_at: F,
}

impl<F> EmbeddedRegionResolver<F>
where
    F: Fn(usize) -> Option<Coords>,
{
    pub fn new(region_start: usize, origin_top: f64, origin_left: f64, coords_at: F) -> Self {
        Self {
            region_start,
            origin: (origin_top, origin_left),
            coords_at,
        }
    }
}

impl<F> AnchorResolver for EmbeddedRegionResolver<F>
where
    F: Fn(usize) -> Option<Coords>,
{
    fn coords_at(&self, pos: usize) -> Option<Coords> {
        let local = pos.checked_sub(self.region_start)?;
        let (dy, dx) = self.origin;
        (self.coords_at)(local).map(|c| c.offset(dy, dx))
    }
}

/// One host resolver plus one resolver per embedded region.
pub struct ResolverSet {
    host: Box<dyn AnchorResolver>,
    regions: HashMap<SmolStr, Box<dyn AnchorResolver>>,
}

impl ResolverSet {
    pub fn new(host: impl AnchorResolver + 'static) -> Self {
        Self {
            host: Box::new(host),
            regions: HashMap::new(),
        }
    }

    pub fn with_region(
        mut self,
        region: impl Into<SmolStr>,
        resolver: impl AnchorResolver + 'static,
    ) -> Self {
        self.regions.insert(region.into(), Box::new(resolver));
        self
    }

    /// Resolve `pos` with the resolver matching its context. Regions with no
    /// registered resolver fall back to the host.
    pub fn resolve(&self, context: &AnchorContext, pos: usize) -> Option<Coords> {
        match context {
            AnchorContext::Host => self.host.coords_at(pos),
            AnchorContext::Embedded { region } => match self.regions.get(region) {
                Some(resolver) => resolver.coords_at(pos),
                None => {
                    tracing::trace!(
                        target: "weaver::comments::layout",
                        %region,
                        "no resolver for embedded region, using host"
                    );
                    self.host.coords_at(pos)
                }
            },
        }
    }
}

impl std::fmt::Debug for ResolverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverSet")
            .field("regions", &self.regions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Measure `comments` against the host view.
///
/// A thread whose anchor does not resolve goes to `unresolved` and the
/// layout pass leaves its bubble out. A thread whose bubble has no rendered
/// height yet is simply missing, which makes the pass report stale.
pub fn measure<D, H>(
    doc: &D,
    comments: &[CommentWithPosition],
    resolvers: &ResolverSet,
    height_of: H,
) -> Measured
where
    D: CommentDocument + ?Sized,
    H: Fn(&str) -> Option<f64>,
{
    let mut measured = Measured::default();
    for comment in comments {
        let context = doc.anchor_context(comment.pos);
        let Some(coords) = resolvers.resolve(&context, comment.pos) else {
            measured.unresolved.insert(comment.thread.id.clone());
            continue;
        };
        if let Some(height) = height_of(comment.id()) {
            measured.measurements.insert(
                comment.thread.id.clone(),
                Measurement {
                    height,
                    anchor_top: coords.top,
                },
            );
        }
    }
    measured
}
