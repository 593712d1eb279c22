//! Pure geometry-merging functions shared by the single-frame and
//! multi-frame batch paths.

use crate::buffer_layout::BufferLayout;
use crate::ecs::EntityId;
use crate::error::{DrawError, DrawResult};
use crate::geometry::Geometry;

/// Walks `entities` in order, grouping them so that no group's cumulative
/// vertex-stream-0 bytes or index bytes exceeds the corresponding block
/// size. Fails if any single source is larger than a block all by itself.
pub fn split_source_entities(
    entities: &[(EntityId, &Geometry)],
    vertex0_block_size_bytes: usize,
    index_block_size_bytes: Option<usize>,
) -> DrawResult<Vec<Vec<EntityId>>> {
    let mut groups = Vec::new();
    let mut current: Vec<EntityId> = Vec::new();
    let mut vx_sum = 0usize;
    let mut ix_sum = 0usize;

    for &(entity_id, geometry) in entities {
        let vx_bytes = geometry.vertex_buffer(0).len();
        let ix_bytes = geometry.index_buffer().map_or(0, |bytes| bytes.len());

        if vx_bytes > vertex0_block_size_bytes
            || index_block_size_bytes.is_some_and(|cap| ix_bytes > cap)
        {
            return Err(DrawError::GeometryExceedsBlockSize);
        }

        let would_exceed_vx = vx_sum + vx_bytes > vertex0_block_size_bytes;
        let would_exceed_ix = index_block_size_bytes.is_some_and(|cap| ix_sum + ix_bytes > cap);

        if !current.is_empty() && (would_exceed_vx || would_exceed_ix) {
            groups.push(std::mem::take(&mut current));
            vx_sum = 0;
            ix_sum = 0;
        }

        current.push(entity_id);
        vx_sum += vx_bytes;
        ix_sum += ix_bytes;
    }

    if !current.is_empty() {
        groups.push(current);
    }

    Ok(groups)
}

/// Concatenates `sources`' vertex streams and (if indexed) index stream
/// into `dest`, remapping each 16-bit index by the running vertex count of
/// vertex stream 0 contributed by the sources ahead of it.
pub fn create_merged_geometry(buffer_layout: &BufferLayout, sources: &[&Geometry], dest: &mut Geometry) {
    let vertex_size0 = buffer_layout.vertex_size_bytes(0).max(1);
    let vertex_counts: Vec<usize> = sources
        .iter()
        .map(|geometry| geometry.vertex_buffer(0).len() / vertex_size0)
        .collect();

    for stream in 0..buffer_layout.vertex_stream_count() {
        dest.clear_vertex_buffer(stream);
        for source in sources {
            dest.extend_vertex_buffer(stream, source.vertex_buffer(stream));
        }
    }

    if buffer_layout.is_indexed() {
        dest.clear_index_buffer();
        let mut vertex_offset: u32 = 0;
        for (source, &vertex_count) in sources.iter().zip(vertex_counts.iter()) {
            if let Some(index_bytes) = source.index_buffer() {
                let remapped: Vec<u8> = index_bytes
                    .chunks_exact(2)
                    .flat_map(|chunk| {
                        let index = u16::from_le_bytes([chunk[0], chunk[1]]) as u32 + vertex_offset;
                        (index as u16).to_le_bytes()
                    })
                    .collect();
                dest.extend_index_buffer(&remapped);
            }
            vertex_offset += vertex_count as u32;
        }
    }

    dest.mark_all_updated();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_layout::{BufferUsage, VertexAttributeLayout};

    fn layout(indexed: bool, block_size: usize) -> BufferLayout {
        BufferLayout::new(
            BufferUsage::Static,
            vec![VertexAttributeLayout {
                attributes: Vec::new(),
                stride_bytes: 20,
            }],
            vec![block_size],
            indexed.then_some(block_size),
        )
    }

    fn geometry_with(vertex_bytes: &[u8], index_bytes: Option<&[u8]>) -> Geometry {
        let mut g = Geometry::new(1, index_bytes.is_some(), true);
        g.set_vertex_buffer(0, vertex_bytes.to_vec());
        if let Some(bytes) = index_bytes {
            g.set_index_buffer(bytes.to_vec());
        }
        g
    }

    #[test]
    fn merge_concatenates_vertices_and_remaps_indices() {
        let layout = layout(true, 1024);
        let a = geometry_with(&[0u8; 20], Some(&0u16.to_le_bytes()));
        let b_indices = [0u16.to_le_bytes(), 1u16.to_le_bytes()].concat();
        let b = geometry_with(&[0u8; 40], Some(&b_indices));

        let mut dest = Geometry::new(1, true, true);
        create_merged_geometry(&layout, &[&a, &b], &mut dest);

        assert_eq!(dest.vertex_buffer(0).len(), 60);
        let index_bytes = dest.index_buffer().unwrap();
        let indices: Vec<u16> = index_bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn split_starts_a_new_group_when_capacity_would_be_exceeded() {
        let entities = [
            (1u64, geometry_with(&[0u8; 60], None)),
            (2u64, geometry_with(&[0u8; 60], None)),
            (3u64, geometry_with(&[0u8; 60], None)),
        ];
        let refs: Vec<(EntityId, &Geometry)> = entities.iter().map(|(id, g)| (*id, g)).collect();
        let groups = split_source_entities(&refs, 100, None).unwrap();
        assert_eq!(groups, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn oversized_single_source_fails() {
        let entities = [(1u64, geometry_with(&[0u8; 200], None))];
        let refs: Vec<(EntityId, &Geometry)> = entities.iter().map(|(id, g)| (*id, g)).collect();
        assert!(split_source_entities(&refs, 100, None).is_err());
    }
}
