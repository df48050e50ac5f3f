use geo::BoundingRect;
use rstar::{
    primitives::{GeomWithData, Rectangle},
    RTree, AABB,
};

type IndexedEnvelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn envelope(geometry: &geo::Geometry) -> Option<AABB<[f64; 2]>> {
    geometry.bounding_rect().map(|rect| {
        AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
    })
}

/// R-tree over the bounding boxes of a set of geometries, used to narrow down pairs before
/// running exact predicates.
pub struct EnvelopeIndex {
    rtree: RTree<IndexedEnvelope>,
}

impl EnvelopeIndex {
    /// Index `geometries` by position. Empty geometries have no envelope and are never returned.
    pub fn new(geometries: &[&geo::Geometry]) -> Self {
        let envelopes = geometries
            .iter()
            .enumerate()
            .filter_map(|(index, geometry)| {
                envelope(geometry).map(|aabb| {
                    IndexedEnvelope::new(Rectangle::from_aabb(aabb), index)
                })
            })
            .collect();
        Self {
            rtree: RTree::bulk_load(envelopes),
        }
    }

    /// Positions of indexed geometries whose envelope intersects the envelope of `geometry`,
    /// ascending.
    pub fn candidates(&self, geometry: &geo::Geometry) -> Vec<usize> {
        let Some(aabb) = envelope(geometry) else {
            return Vec::new();
        };
        let mut candidates: Vec<usize> = self
            .rtree
            .locate_in_envelope_intersecting(&aabb)
            .map(|indexed| indexed.data)
            .collect();
        candidates.sort_unstable();
        candidates
    }
}
