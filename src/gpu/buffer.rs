//! Fixed-size typed GPU buffers with tracked binding state.
//!
//! A [`Buffer`] owns one device allocation of `item_count` items. It
//! remembers the single binding point it currently occupies, so unbinding
//! always uses the same form (generic or indexed) that bound it.

use std::fmt;

use bytemuck::Pod;

use super::device::{
    BindingPoint, BufferHandle, BufferTarget, BufferUsage, GpuDevice,
};
use super::element::ElementType;

/// Buffer operation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Data does not hold exactly `item_count` items.
    ItemCountMismatch {
        /// Items the buffer holds.
        expected: usize,
        /// Items supplied.
        actual: usize,
    },
    /// Host type size differs from the buffer's element size.
    ElementSizeMismatch {
        /// Element size of the buffer.
        expected: u32,
        /// Size of the host type.
        actual: usize,
    },
    /// The target has no numbered binding slots.
    NotIndexable(BufferTarget),
    /// Operation requires an unmapped buffer.
    Mapped,
    /// The device refused to map the buffer.
    MapFailed,
    /// Mapped bytes are not aligned for the requested host type.
    Misaligned,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemCountMismatch { expected, actual } => {
                write!(f, "expected {expected} items, got {actual}")
            }
            Self::ElementSizeMismatch { expected, actual } => write!(
                f,
                "element size is {expected} bytes, host type is {actual} bytes"
            ),
            Self::NotIndexable(target) => {
                write!(f, "{target} has no indexed binding points")
            }
            Self::Mapped => write!(f, "buffer is mapped"),
            Self::MapFailed => write!(f, "device failed to map buffer"),
            Self::Misaligned => {
                write!(f, "mapped bytes are misaligned for the host type")
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// Fixed-size GPU memory region of `item_count` items.
///
/// The item count never changes; recreate the buffer to resize it. A
/// buffer must be [released](Buffer::release) on the device that created
/// it.
#[derive(Debug, PartialEq, Eq)]
pub struct Buffer {
    handle: BufferHandle,
    item_count: usize,
    element: ElementType,
    binding: Option<BindingPoint>,
    usage: BufferUsage,
    mapped: bool,
}

impl Buffer {
    /// Zeroed buffer of `item_count` items of host type `T`, hinted as
    /// [`BufferUsage::DynamicDraw`].
    pub fn new<T: Pod>(device: &mut dyn GpuDevice, item_count: usize) -> Self {
        Self::with_usage::<T>(device, item_count, BufferUsage::default())
    }

    /// Zeroed buffer of `item_count` items of `T` with a usage hint.
    pub fn with_usage<T: Pod>(
        device: &mut dyn GpuDevice,
        item_count: usize,
        usage: BufferUsage,
    ) -> Self {
        Self::with_element(device, item_count, ElementType::of::<T>(), usage)
    }

    /// Zeroed buffer of `item_count` items of an explicit element type.
    pub fn with_element(
        device: &mut dyn GpuDevice,
        item_count: usize,
        element: ElementType,
        usage: BufferUsage,
    ) -> Self {
        if !element.is_reflectable() {
            log::debug!(
                "Buffer: {element} items cannot be bound as vertex attributes"
            );
        }
        let size = item_count as u64 * u64::from(element.size());
        Self {
            handle: device.create_buffer(size, usage),
            item_count,
            element,
            binding: None,
            usage,
            mapped: false,
        }
    }

    /// Buffer initialized with `data`, hinted as
    /// [`BufferUsage::StaticDraw`].
    pub fn from_slice<T: Pod>(device: &mut dyn GpuDevice, data: &[T]) -> Self {
        let mut buffer = Self::with_usage::<T>(device, data.len(), BufferUsage::StaticDraw);
        buffer.upload(device, bytemuck::cast_slice(data));
        buffer
    }

    /// Usage hint given at allocation.
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Device handle.
    #[must_use]
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Number of items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Item shape.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.element
    }

    /// Allocation size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.item_count as u64 * u64::from(self.element.size())
    }

    /// Binding point currently occupied.
    #[must_use]
    pub fn binding(&self) -> Option<BindingPoint> {
        self.binding
    }

    /// Whether the buffer is mapped.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Bind to the generic point of `target`, releasing any prior binding.
    pub fn bind(&mut self, device: &mut dyn GpuDevice, target: BufferTarget) {
        self.unbind(device);
        device.bind_buffer(target, Some(self.handle));
        self.binding = Some(BindingPoint::Generic(target));
    }

    /// Bind to slot `index` of `target`, releasing any prior binding.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::NotIndexable`] for targets without numbered
    /// slots; the buffer's binding is left unchanged.
    pub fn bind_indexed(
        &mut self,
        device: &mut dyn GpuDevice,
        target: BufferTarget,
        index: u32,
    ) -> Result<(), BufferError> {
        if !target.is_indexed() {
            return Err(BufferError::NotIndexable(target));
        }
        self.unbind(device);
        device.bind_buffer_base(target, index, Some(self.handle));
        self.binding = Some(BindingPoint::Indexed(target, index));
        Ok(())
    }

    /// Re-occupy a previously recorded binding point.
    pub fn rebind(&mut self, device: &mut dyn GpuDevice, point: BindingPoint) {
        match point {
            BindingPoint::Generic(target) => self.bind(device, target),
            BindingPoint::Indexed(target, index) => {
                if let Err(e) = self.bind_indexed(device, target, index) {
                    log::warn!("Buffer: cannot restore {point}: {e}");
                }
            }
        }
    }

    /// Release the current binding. No-op when unbound.
    ///
    /// The point is only cleared while it still holds this buffer, so a
    /// later occupant of the same point is left in place.
    pub fn unbind(&mut self, device: &mut dyn GpuDevice) {
        let Some(point) = self.binding.take() else {
            return;
        };
        if device.bound_buffer(point) != Some(self.handle) {
            return;
        }
        match point {
            BindingPoint::Generic(target) => device.bind_buffer(target, None),
            BindingPoint::Indexed(target, index) => {
                device.bind_buffer_base(target, index, None);
            }
        }
    }

    /// Replace the whole contents with `data`.
    ///
    /// Uses the copy-write staging point internally and restores whatever
    /// was bound there before.
    ///
    /// # Errors
    ///
    /// Fails when `data` does not hold exactly `item_count` items of the
    /// buffer's element size, or when the buffer is mapped.
    pub fn set_data<T: Pod>(
        &mut self,
        device: &mut dyn GpuDevice,
        data: &[T],
    ) -> Result<(), BufferError> {
        self.check_host_type::<T>()?;
        if data.len() != self.item_count {
            return Err(BufferError::ItemCountMismatch {
                expected: self.item_count,
                actual: data.len(),
            });
        }
        if self.mapped {
            return Err(BufferError::Mapped);
        }
        self.upload(device, bytemuck::cast_slice(data));
        Ok(())
    }

    fn upload(&self, device: &mut dyn GpuDevice, bytes: &[u8]) {
        let staging = BindingPoint::Generic(BufferTarget::CopyWrite);
        let previous = device.bound_buffer(staging);
        device.bind_buffer(BufferTarget::CopyWrite, Some(self.handle));
        device.buffer_sub_data(BufferTarget::CopyWrite, 0, bytes);
        device.bind_buffer(BufferTarget::CopyWrite, previous);
    }

    /// Map the contents for host access.
    ///
    /// Mapping an already mapped buffer returns the same region. The
    /// returned borrow ends any use of the region before the device is used
    /// again; call [`Buffer::unmap`] before the buffer takes part in a draw
    /// or dispatch.
    pub fn map<'d>(&mut self, device: &'d mut dyn GpuDevice) -> Option<&'d mut [u8]> {
        let region = device.map_buffer(self.handle)?;
        self.mapped = true;
        Some(region)
    }

    /// Map the contents as a slice of `T`.
    ///
    /// # Errors
    ///
    /// Fails when `T` does not match the element size or the device cannot
    /// map the buffer.
    pub fn map_as<'d, T: Pod>(
        &mut self,
        device: &'d mut dyn GpuDevice,
    ) -> Result<&'d mut [T], BufferError> {
        self.check_host_type::<T>()?;
        let bytes = self.map(device).ok_or(BufferError::MapFailed)?;
        bytemuck::try_cast_slice_mut(bytes).map_err(|_| BufferError::Misaligned)
    }

    /// End the mapping. No-op when not mapped.
    pub fn unmap(&mut self, device: &mut dyn GpuDevice) {
        if self.mapped {
            device.unmap_buffer(self.handle);
            self.mapped = false;
        }
    }

    /// Copy the contents out, mapping temporarily if needed.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::map_as`].
    pub fn read<T: Pod>(&mut self, device: &mut dyn GpuDevice) -> Result<Vec<T>, BufferError> {
        let was_mapped = self.mapped;
        let contents = self.map_as::<T>(device)?.to_vec();
        if !was_mapped {
            self.unmap(device);
        }
        Ok(contents)
    }

    /// Unbind, unmap and free the device allocation.
    pub fn release(mut self, device: &mut dyn GpuDevice) {
        self.unbind(device);
        self.unmap(device);
        device.destroy_buffer(self.handle);
    }

    fn check_host_type<T: Pod>(&self) -> Result<(), BufferError> {
        let actual = std::mem::size_of::<T>();
        if actual == self.element.size() as usize {
            Ok(())
        } else {
            Err(BufferError::ElementSizeMismatch {
                expected: self.element.size(),
                actual,
            })
        }
    }
}
