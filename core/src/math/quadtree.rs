use crate::config::ProjectionConfig;

/// Per-level tile indices of a pixel, coarsest level first.
///
/// For level `L` in `1..=zoom` the pixel falls into tile
/// `(x >> (tile_shift + zoom - L), y >> (tile_shift + zoom - L))`, indexed
/// row-major as `(ty << L) + tx`. Sorting rows by this key lexicographically
/// keeps every ancestor tile's rows contiguous at every level.
pub fn cluster_key(x: u32, y: u32, projection: &ProjectionConfig) -> Vec<u64> {
    let zoom = u32::from(projection.zoom_level);
    let tile_shift = projection.tile_shift();
    (1..=zoom)
        .map(|level| {
            let shift = tile_shift + (zoom - level);
            let tx = u64::from(x >> shift);
            let ty = u64::from(y >> shift);
            (ty << level) + tx
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_has_one_index_per_level() {
        let key = cluster_key(0, 0, &ProjectionConfig::default());
        assert_eq!(key.len(), 13);
        assert!(key.iter().all(|&idx| idx == 0));
    }

    #[test]
    fn grid_center_indices() {
        let center = 1u32 << 20;
        let key = cluster_key(center, center, &ProjectionConfig::default());
        // level 1: tile (1, 1) -> (1 << 1) + 1
        assert_eq!(key[0], 3);
        // level 13: tile (4096, 4096) -> (4096 << 13) + 4096
        assert_eq!(key[12], (4096 << 13) + 4096);
    }

    #[test]
    fn east_half_sorts_after_west_half_in_the_same_row() {
        let projection = ProjectionConfig::default();
        let west = cluster_key((1 << 20) - 1, 0, &projection);
        let east = cluster_key(1 << 20, 0, &projection);
        assert!(west < east);
        assert_eq!(west[0], 0);
        assert_eq!(east[0], 1);
    }
}
