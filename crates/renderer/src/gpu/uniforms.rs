//! Packs draw-time uniform values into the std140 block a program reflected.

use crate::backend::{UniformLocation, UniformValue};

use super::reflect::ProgramLayout;

/// Byte image of one program's uniform block.
#[derive(Debug, Clone)]
pub(crate) struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    /// Zeroed block sized for `layout`, padded to a 16-byte multiple.
    pub fn new(layout: &ProgramLayout) -> Self {
        let size = layout.block_size.max(16).next_multiple_of(16) as usize;
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Writes every block value of a draw. Sampler values carry no bytes.
    ///
    /// Returns how many writes fell outside the block; each one is logged,
    /// since it means the values disagree with the reflected layout.
    pub fn write_all(
        &mut self,
        layout: &ProgramLayout,
        values: &[(UniformLocation, UniformValue<'_>)],
    ) -> usize {
        let mut dropped = 0;
        for (location, value) in values {
            let UniformLocation::Block(index) = location else {
                continue;
            };
            let Some(member) = layout.member(*index) else {
                tracing::warn!(index, "no reflected block member for uniform value");
                dropped += 1;
                continue;
            };
            let (offset, stride) = (member.offset as usize, member.stride as usize);
            let outside = match value {
                UniformValue::Float(value) => self.put(offset, bytemuck::bytes_of(value)),
                UniformValue::Int(value) => self.put(offset, bytemuck::bytes_of(value)),
                UniformValue::Vec2(value) => self.put(offset, bytemuck::cast_slice(value)),
                UniformValue::Mat4(value) => self.put(offset, bytemuck::cast_slice(value)),
                UniformValue::Floats(values) => values
                    .iter()
                    .enumerate()
                    .map(|(element, value)| {
                        self.put(offset + element * stride, bytemuck::bytes_of(value))
                    })
                    .sum(),
                UniformValue::Vec2s(values) => values
                    .iter()
                    .enumerate()
                    .map(|(element, value)| {
                        self.put(offset + element * stride, bytemuck::cast_slice(value))
                    })
                    .sum(),
                UniformValue::Sampler(_) => 0,
            };
            if outside > 0 {
                tracing::warn!(
                    member = %member.name,
                    offset,
                    writes = outside,
                    block_size = self.bytes.len(),
                    "uniform value runs past the end of the block; extra writes dropped"
                );
                dropped += outside;
            }
        }
        dropped
    }

    /// Copies `data` in at `offset`. Returns 1 if it did not fit and was
    /// dropped, 0 otherwise.
    fn put(&mut self, offset: usize, data: &[u8]) -> usize {
        match self.bytes.get_mut(offset..offset + data.len()) {
            Some(slot) => {
                slot.copy_from_slice(data);
                0
            }
            None => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::reflect::BlockMember;

    fn layout() -> ProgramLayout {
        ProgramLayout {
            block_size: 56,
            members: vec![
                BlockMember {
                    name: "uResolution".into(),
                    offset: 0,
                    stride: 0,
                },
                BlockMember {
                    name: "isVertical".into(),
                    offset: 8,
                    stride: 0,
                },
                BlockMember {
                    name: "weightsH".into(),
                    offset: 16,
                    stride: 16,
                },
            ],
            ..ProgramLayout::default()
        }
    }

    fn float_at(block: &UniformBlock, offset: usize) -> f32 {
        bytemuck::pod_read_unaligned(&block.bytes()[offset..offset + 4])
    }

    #[test]
    fn block_is_padded_to_sixteen_bytes() {
        assert_eq!(UniformBlock::new(&layout()).size(), 64);
        assert_eq!(UniformBlock::new(&ProgramLayout::default()).size(), 16);
    }

    #[test]
    fn arrays_follow_the_reflected_stride() {
        let layout = layout();
        let mut block = UniformBlock::new(&layout);
        let weights = [0.25_f32, 0.5, 0.75];
        let dropped = block.write_all(
            &layout,
            &[
                (UniformLocation::Block(0), UniformValue::Vec2([640.0, 480.0])),
                (UniformLocation::Block(1), UniformValue::Int(1)),
                (UniformLocation::Block(2), UniformValue::Floats(&weights)),
                (UniformLocation::Sampler(2), UniformValue::Sampler(0)),
            ],
        );
        assert_eq!(dropped, 0);
        assert_eq!(float_at(&block, 0), 640.0);
        assert_eq!(float_at(&block, 4), 480.0);
        let vertical: i32 = bytemuck::pod_read_unaligned(&block.bytes()[8..12]);
        assert_eq!(vertical, 1);
        assert_eq!(float_at(&block, 16), 0.25);
        assert_eq!(float_at(&block, 32), 0.5);
        assert_eq!(float_at(&block, 48), 0.75);
        assert_eq!(float_at(&block, 20), 0.0);
    }

    #[test]
    fn writes_past_the_block_are_counted_and_dropped() {
        let layout = layout();
        let mut block = UniformBlock::new(&layout);
        let weights = [1.0_f32; 8];
        // Elements 0..=2 land at 16, 32 and 48; the other five overflow.
        let dropped = block.write_all(
            &layout,
            &[(UniformLocation::Block(2), UniformValue::Floats(&weights))],
        );
        assert_eq!(dropped, 5);
        assert_eq!(float_at(&block, 48), 1.0);
        assert_eq!(block.size(), 64);
    }

    #[test]
    fn values_for_unknown_members_are_counted() {
        let layout = layout();
        let mut block = UniformBlock::new(&layout);
        let dropped = block.write_all(
            &layout,
            &[
                (UniformLocation::Block(7), UniformValue::Float(2.0)),
                (UniformLocation::Block(0), UniformValue::Vec2([1.0, 2.0])),
            ],
        );
        assert_eq!(dropped, 1);
        assert_eq!(float_at(&block, 0), 1.0);
    }
}
