//! Pipeline barriers.
//!
//! Barriers are plain values built through [`BufferBarrierBuilder`],
//! [`ImageBarrierBuilder`], and [`MemoryBarrierBuilder`]. A builder refuses to
//! produce a resource barrier until a target is bound.
//!
//! Queue-family ownership transfer takes two barriers with the same family
//! pair: a release recorded on the producer's queue that keeps the layout, and
//! an acquire recorded on the consumer's queue that may transition it.
//! [`ownership_transfer_pair`] and [`buffer_ownership_transfer_pair`] build both.

use crate::error::{GpuError, Result};
use crate::memory::{Buffer, Image};
use crate::swapchain::Swapchain;
use crate::types::{fold_access, AccessFlag, ImageLayout, ImageViewInfo};
use ash::vk;

/// Any barrier a recorder can insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessBarrier {
    Buffer(BufferBarrier),
    Image(ImageBarrier),
    Memory(MemoryBarrier),
}

impl From<BufferBarrier> for AccessBarrier {
    fn from(barrier: BufferBarrier) -> Self {
        Self::Buffer(barrier)
    }
}

impl From<ImageBarrier> for AccessBarrier {
    fn from(barrier: ImageBarrier) -> Self {
        Self::Image(barrier)
    }
}

impl From<MemoryBarrier> for AccessBarrier {
    fn from(barrier: MemoryBarrier) -> Self {
        Self::Memory(barrier)
    }
}

/// Visibility and ownership transition for a buffer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    buffer: vk::Buffer,
    offset: u64,
    size: u64,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    src_queue_family: u32,
    dst_queue_family: u32,
}

impl BufferBarrier {
    pub fn builder() -> BufferBarrierBuilder {
        BufferBarrierBuilder::default()
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn src_access(&self) -> vk::AccessFlags {
        self.src_access
    }

    pub fn dst_access(&self) -> vk::AccessFlags {
        self.dst_access
    }

    pub fn src_queue_family(&self) -> u32 {
        self.src_queue_family
    }

    pub fn dst_queue_family(&self) -> u32 {
        self.dst_queue_family
    }

    pub fn is_ownership_transfer(&self) -> bool {
        is_family_transfer(self.src_queue_family, self.dst_queue_family)
    }

    pub fn to_vk(&self) -> vk::BufferMemoryBarrier<'static> {
        vk::BufferMemoryBarrier::default()
            .buffer(self.buffer)
            .offset(self.offset)
            .size(self.size)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(self.src_queue_family)
            .dst_queue_family_index(self.dst_queue_family)
    }
}

/// Builder for [`BufferBarrier`].
#[derive(Debug, Clone)]
pub struct BufferBarrierBuilder {
    target: Option<(vk::Buffer, u64, u64)>,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    src_queue_family: u32,
    dst_queue_family: u32,
}

impl Default for BufferBarrierBuilder {
    fn default() -> Self {
        Self {
            target: None,
            src_access: vk::AccessFlags::NONE,
            dst_access: vk::AccessFlags::NONE,
            src_queue_family: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family: vk::QUEUE_FAMILY_IGNORED,
        }
    }
}

impl BufferBarrierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cover the whole buffer.
    #[must_use]
    pub fn buffer(self, buffer: &Buffer) -> Self {
        self.raw_buffer(buffer.handle(), 0, vk::WHOLE_SIZE)
    }

    #[must_use]
    pub fn raw_buffer(mut self, buffer: vk::Buffer, offset: u64, size: u64) -> Self {
        self.target = Some((buffer, offset, size));
        self
    }

    #[must_use]
    pub fn src_access(mut self, access: &[AccessFlag]) -> Self {
        self.src_access = fold_access(access);
        self
    }

    #[must_use]
    pub fn dst_access(mut self, access: &[AccessFlag]) -> Self {
        self.dst_access = fold_access(access);
        self
    }

    /// Alias of [`Self::src_access`].
    #[must_use]
    pub fn priority_access(self, access: &[AccessFlag]) -> Self {
        self.src_access(access)
    }

    /// Alias of [`Self::dst_access`].
    #[must_use]
    pub fn wait_access(self, access: &[AccessFlag]) -> Self {
        self.dst_access(access)
    }

    #[must_use]
    pub fn src_queue_family(mut self, index: u32) -> Self {
        self.src_queue_family = index;
        self
    }

    #[must_use]
    pub fn dst_queue_family(mut self, index: u32) -> Self {
        self.dst_queue_family = index;
        self
    }

    pub fn build(&self) -> Result<BufferBarrier> {
        let (buffer, offset, size) = self
            .target
            .ok_or_else(|| GpuError::Validation("Buffer barrier requires a buffer".to_string()))?;

        Ok(BufferBarrier {
            buffer,
            offset,
            size,
            src_access: self.src_access,
            dst_access: self.dst_access,
            src_queue_family: self.src_queue_family,
            dst_queue_family: self.dst_queue_family,
        })
    }
}

/// Visibility, layout, and ownership transition for an image subresource range.
#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    old_layout: ImageLayout,
    new_layout: ImageLayout,
    src_queue_family: u32,
    dst_queue_family: u32,
}

impl ImageBarrier {
    pub fn builder() -> ImageBarrierBuilder {
        ImageBarrierBuilder::default()
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn range(&self) -> vk::ImageSubresourceRange {
        self.range
    }

    pub fn src_access(&self) -> vk::AccessFlags {
        self.src_access
    }

    pub fn dst_access(&self) -> vk::AccessFlags {
        self.dst_access
    }

    pub fn old_layout(&self) -> ImageLayout {
        self.old_layout
    }

    pub fn new_layout(&self) -> ImageLayout {
        self.new_layout
    }

    pub fn src_queue_family(&self) -> u32 {
        self.src_queue_family
    }

    pub fn dst_queue_family(&self) -> u32 {
        self.dst_queue_family
    }

    pub fn is_ownership_transfer(&self) -> bool {
        is_family_transfer(self.src_queue_family, self.dst_queue_family)
    }

    pub fn to_vk(&self) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .image(self.image)
            .subresource_range(self.range)
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout.into())
            .new_layout(self.new_layout.into())
            .src_queue_family_index(self.src_queue_family)
            .dst_queue_family_index(self.dst_queue_family)
    }
}

// ash does not compare subresource ranges.
impl PartialEq for ImageBarrier {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image
            && same_range(&self.range, &other.range)
            && self.src_access == other.src_access
            && self.dst_access == other.dst_access
            && self.old_layout == other.old_layout
            && self.new_layout == other.new_layout
            && self.src_queue_family == other.src_queue_family
            && self.dst_queue_family == other.dst_queue_family
    }
}

impl Eq for ImageBarrier {}

/// Field-wise equality of two subresource ranges.
pub fn same_range(a: &vk::ImageSubresourceRange, b: &vk::ImageSubresourceRange) -> bool {
    a.aspect_mask == b.aspect_mask
        && a.base_mip_level == b.base_mip_level
        && a.level_count == b.level_count
        && a.base_array_layer == b.base_array_layer
        && a.layer_count == b.layer_count
}

/// Both families named and different. A single ignored side is not a transfer.
const fn is_family_transfer(src: u32, dst: u32) -> bool {
    src != vk::QUEUE_FAMILY_IGNORED && dst != vk::QUEUE_FAMILY_IGNORED && src != dst
}

/// Builder for [`ImageBarrier`].
#[derive(Debug, Clone)]
pub struct ImageBarrierBuilder {
    target: Option<(vk::Image, vk::ImageSubresourceRange)>,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    old_layout: ImageLayout,
    new_layout: ImageLayout,
    src_queue_family: u32,
    dst_queue_family: u32,
}

impl Default for ImageBarrierBuilder {
    fn default() -> Self {
        Self {
            target: None,
            src_access: vk::AccessFlags::NONE,
            dst_access: vk::AccessFlags::NONE,
            old_layout: ImageLayout::Undefined,
            new_layout: ImageLayout::Undefined,
            src_queue_family: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family: vk::QUEUE_FAMILY_IGNORED,
        }
    }
}

impl ImageBarrierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an image and the subresource range to transition.
    #[must_use]
    pub fn image(self, image: &Image, view: ImageViewInfo) -> Self {
        self.raw_image(image.handle(), view)
    }

    #[must_use]
    pub fn raw_image(mut self, image: vk::Image, view: ImageViewInfo) -> Self {
        self.target = Some((image, view.subresource_range()));
        self
    }

    /// Bind the swapchain's current image with a single-level colour range.
    #[must_use]
    pub fn swapchain(self, swapchain: &Swapchain) -> Self {
        self.raw_image(swapchain.image(), ImageViewInfo::default())
    }

    #[must_use]
    pub fn src_access(mut self, access: &[AccessFlag]) -> Self {
        self.src_access = fold_access(access);
        self
    }

    #[must_use]
    pub fn dst_access(mut self, access: &[AccessFlag]) -> Self {
        self.dst_access = fold_access(access);
        self
    }

    /// Alias of [`Self::src_access`].
    #[must_use]
    pub fn priority_access(self, access: &[AccessFlag]) -> Self {
        self.src_access(access)
    }

    /// Alias of [`Self::dst_access`].
    #[must_use]
    pub fn wait_access(self, access: &[AccessFlag]) -> Self {
        self.dst_access(access)
    }

    #[must_use]
    pub fn layouts(mut self, old: ImageLayout, new: ImageLayout) -> Self {
        self.old_layout = old;
        self.new_layout = new;
        self
    }

    #[must_use]
    pub fn src_queue_family(mut self, index: u32) -> Self {
        self.src_queue_family = index;
        self
    }

    #[must_use]
    pub fn dst_queue_family(mut self, index: u32) -> Self {
        self.dst_queue_family = index;
        self
    }

    pub fn build(&self) -> Result<ImageBarrier> {
        let (image, range) = self.target.ok_or_else(|| {
            GpuError::Validation(
                "Image barrier requires an image with a range or a swapchain".to_string(),
            )
        })?;

        Ok(ImageBarrier {
            image,
            range,
            src_access: self.src_access,
            dst_access: self.dst_access,
            old_layout: self.old_layout,
            new_layout: self.new_layout,
            src_queue_family: self.src_queue_family,
            dst_queue_family: self.dst_queue_family,
        })
    }
}

/// Global memory dependency with no resource attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBarrier {
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
}

impl MemoryBarrier {
    pub fn builder() -> MemoryBarrierBuilder {
        MemoryBarrierBuilder::default()
    }

    pub fn src_access(&self) -> vk::AccessFlags {
        self.src_access
    }

    pub fn dst_access(&self) -> vk::AccessFlags {
        self.dst_access
    }

    pub fn to_vk(&self) -> vk::MemoryBarrier<'static> {
        vk::MemoryBarrier::default()
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBarrierBuilder {
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
}

impl MemoryBarrierBuilder {
    #[must_use]
    pub fn src_access(mut self, access: &[AccessFlag]) -> Self {
        self.src_access = fold_access(access);
        self
    }

    #[must_use]
    pub fn dst_access(mut self, access: &[AccessFlag]) -> Self {
        self.dst_access = fold_access(access);
        self
    }

    pub fn build(&self) -> MemoryBarrier {
        MemoryBarrier {
            src_access: self.src_access,
            dst_access: self.dst_access,
        }
    }
}

/// Release/acquire pair for moving an image between queue families.
///
/// The template supplies the target, range, and access flags. The release
/// keeps `release_layout`; the acquire transitions it to `acquire_new_layout`.
pub fn ownership_transfer_pair(
    template: ImageBarrierBuilder,
    src_family: u32,
    dst_family: u32,
    release_layout: ImageLayout,
    acquire_new_layout: ImageLayout,
) -> Result<(ImageBarrier, ImageBarrier)> {
    let template = template
        .src_queue_family(src_family)
        .dst_queue_family(dst_family);

    let release = template
        .clone()
        .layouts(release_layout, release_layout)
        .build()?;
    let acquire = template
        .layouts(release_layout, acquire_new_layout)
        .build()?;

    Ok((release, acquire))
}

/// Release/acquire pair for moving a buffer between queue families.
pub fn buffer_ownership_transfer_pair(
    template: BufferBarrierBuilder,
    src_family: u32,
    dst_family: u32,
) -> Result<(BufferBarrier, BufferBarrier)> {
    let barrier = template
        .src_queue_family(src_family)
        .dst_queue_family(dst_family)
        .build()?;
    Ok((barrier, barrier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn image_template() -> ImageBarrierBuilder {
        ImageBarrierBuilder::new()
            .raw_image(
                vk::Image::from_raw(0x40),
                ImageViewInfo {
                    mip_levels: 4,
                    ..ImageViewInfo::default()
                },
            )
            .src_access(&[AccessFlag::TransferWrite])
            .dst_access(&[AccessFlag::ShaderRead])
    }

    #[test]
    fn buffer_barrier_without_buffer_is_rejected() {
        let err = BufferBarrierBuilder::new()
            .src_access(&[AccessFlag::TransferWrite])
            .build()
            .unwrap_err();
        assert!(matches!(err, GpuError::Validation(_)));
        assert_eq!(
            pandolabo_core::Error::from(err).kind(),
            pandolabo_core::ErrorKind::Validation
        );
    }

    #[test]
    fn image_barrier_without_target_is_rejected() {
        let err = ImageBarrierBuilder::new()
            .layouts(ImageLayout::Undefined, ImageLayout::TransferDstOptimal)
            .build()
            .unwrap_err();
        assert!(matches!(err, GpuError::Validation(_)));
    }

    #[test]
    fn queue_families_default_to_ignored() {
        let barrier = BufferBarrierBuilder::new()
            .raw_buffer(vk::Buffer::from_raw(1), 0, 64)
            .build()
            .unwrap();
        assert_eq!(barrier.src_queue_family(), vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.dst_queue_family(), vk::QUEUE_FAMILY_IGNORED);
        assert!(!barrier.is_ownership_transfer());

        let one_sided = BufferBarrierBuilder::new()
            .raw_buffer(vk::Buffer::from_raw(1), 0, 64)
            .src_queue_family(2)
            .build()
            .unwrap();
        assert_eq!(one_sided.src_queue_family(), 2);
        assert_eq!(one_sided.dst_queue_family(), vk::QUEUE_FAMILY_IGNORED);
        assert!(!one_sided.is_ownership_transfer());

        let same_family = BufferBarrierBuilder::new()
            .raw_buffer(vk::Buffer::from_raw(1), 0, 64)
            .src_queue_family(2)
            .dst_queue_family(2)
            .build()
            .unwrap();
        assert!(!same_family.is_ownership_transfer());
    }

    #[test]
    fn one_sided_image_family_is_not_a_transfer() {
        let barrier = image_template().dst_queue_family(1).build().unwrap();
        assert!(!barrier.is_ownership_transfer());
    }

    #[test]
    fn image_barriers_compare_by_range_fields() {
        let a = image_template().build().unwrap();
        let b = image_template().build().unwrap();
        assert_eq!(a, b);
        assert_eq!(AccessBarrier::from(a), AccessBarrier::from(b));

        let narrower = ImageBarrierBuilder::new()
            .raw_image(
                vk::Image::from_raw(0x40),
                ImageViewInfo {
                    mip_levels: 2,
                    ..ImageViewInfo::default()
                },
            )
            .src_access(&[AccessFlag::TransferWrite])
            .dst_access(&[AccessFlag::ShaderRead])
            .build()
            .unwrap();
        assert!(!same_range(&a.range(), &narrower.range()));
        assert_ne!(a, narrower);
    }

    #[test]
    fn access_sets_are_folded() {
        let barrier = BufferBarrierBuilder::new()
            .raw_buffer(vk::Buffer::from_raw(1), 0, vk::WHOLE_SIZE)
            .priority_access(&[AccessFlag::ShaderRead, AccessFlag::ShaderWrite])
            .wait_access(&[AccessFlag::TransferRead])
            .build()
            .unwrap();
        assert_eq!(
            barrier.src_access(),
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        );
        assert_eq!(barrier.to_vk().dst_access_mask, vk::AccessFlags::TRANSFER_READ);
    }

    #[test]
    fn release_keeps_layout_and_acquire_continues_it() {
        let (release, acquire) = ownership_transfer_pair(
            image_template(),
            2,
            0,
            ImageLayout::TransferDstOptimal,
            ImageLayout::ShaderReadOnlyOptimal,
        )
        .unwrap();

        assert_eq!(release.old_layout(), release.new_layout());
        assert_eq!(acquire.old_layout(), release.new_layout());
        assert_eq!(acquire.new_layout(), ImageLayout::ShaderReadOnlyOptimal);

        assert_eq!(release.src_queue_family(), acquire.src_queue_family());
        assert_eq!(release.dst_queue_family(), acquire.dst_queue_family());
        assert!(same_range(&release.range(), &acquire.range()));
        assert_eq!(release.range().level_count, 4);
        assert_eq!(acquire.range().base_mip_level, 0);
        assert_eq!(release.src_access(), acquire.src_access());
        assert!(release.is_ownership_transfer());
    }

    #[test]
    fn buffer_pair_shares_everything() {
        let template = BufferBarrierBuilder::new()
            .raw_buffer(vk::Buffer::from_raw(9), 0, 256)
            .src_access(&[AccessFlag::TransferWrite])
            .dst_access(&[AccessFlag::ShaderRead]);
        let (release, acquire) = buffer_ownership_transfer_pair(template, 1, 0).unwrap();
        assert_eq!(release, acquire);
        assert_eq!(release.src_queue_family(), 1);
        assert_eq!(release.dst_queue_family(), 0);
    }

    #[test]
    fn memory_barrier_needs_no_resource() {
        let barrier = MemoryBarrier::builder()
            .src_access(&[AccessFlag::HostWrite])
            .dst_access(&[AccessFlag::ShaderRead])
            .build();
        assert_eq!(barrier.to_vk().src_access_mask, vk::AccessFlags::HOST_WRITE);
        assert!(matches!(AccessBarrier::from(barrier), AccessBarrier::Memory(_)));
    }
}
