use std::collections::BTreeMap;
use std::fmt;

use bytemuck::Pod;

use super::ParticleError;
use crate::gpu::{Buffer, BufferUsage, GpuDevice};

/// The three named buffer maps of a particle system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferKind {
    /// One item per particle, bound as a storage block.
    Attribute,
    /// Atomic counters.
    AtomicCounter,
    /// Uniform blocks.
    Uniform,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Attribute => "attribute",
            Self::AtomicCounter => "atomic counter",
            Self::Uniform => "uniform",
        })
    }
}

/// Named buffers of one particle system. Each map exclusively owns its
/// buffers; names are unique within a map.
#[derive(Debug)]
pub struct ParticleBuffers {
    particle_count: u32,
    attributes: BTreeMap<String, Buffer>,
    atomic_counters: BTreeMap<String, Buffer>,
    uniforms: BTreeMap<String, Buffer>,
}

impl ParticleBuffers {
    pub(crate) fn new(particle_count: u32) -> Self {
        Self {
            particle_count,
            attributes: BTreeMap::new(),
            atomic_counters: BTreeMap::new(),
            uniforms: BTreeMap::new(),
        }
    }

    /// Items in every attribute buffer.
    #[must_use]
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    fn map(&self, kind: BufferKind) -> &BTreeMap<String, Buffer> {
        match kind {
            BufferKind::Attribute => &self.attributes,
            BufferKind::AtomicCounter => &self.atomic_counters,
            BufferKind::Uniform => &self.uniforms,
        }
    }

    fn map_mut(&mut self, kind: BufferKind) -> &mut BTreeMap<String, Buffer> {
        match kind {
            BufferKind::Attribute => &mut self.attributes,
            BufferKind::AtomicCounter => &mut self.atomic_counters,
            BufferKind::Uniform => &mut self.uniforms,
        }
    }

    fn insert(
        &mut self,
        device: &mut dyn GpuDevice,
        kind: BufferKind,
        name: &str,
        create: impl FnOnce(&mut dyn GpuDevice) -> Buffer,
    ) -> Result<&mut Buffer, ParticleError> {
        use std::collections::btree_map::Entry;

        match self.map_mut(kind).entry(name.to_owned()) {
            Entry::Occupied(_) => {
                log::warn!("ParticleSystem: {kind} buffer \"{name}\" already exists");
                Err(ParticleError::DuplicateBuffer {
                    kind,
                    name: name.to_owned(),
                })
            }
            Entry::Vacant(slot) => Ok(slot.insert(create(device))),
        }
    }

    /// Add a per-particle attribute of host type `T`, zero-initialized.
    ///
    /// # Errors
    ///
    /// Fails when an attribute of that name exists; it is left untouched.
    pub fn add_attribute<T: Pod>(
        &mut self,
        device: &mut dyn GpuDevice,
        name: &str,
    ) -> Result<&mut Buffer, ParticleError> {
        let count = self.particle_count as usize;
        self.insert(device, BufferKind::Attribute, name, |device| {
            Buffer::with_usage::<T>(device, count, BufferUsage::DynamicRead)
        })
    }

    /// Add `item_count` `u32` atomic counters.
    ///
    /// # Errors
    ///
    /// Fails when a counter buffer of that name exists.
    pub fn add_atomic_counter(
        &mut self,
        device: &mut dyn GpuDevice,
        name: &str,
        item_count: usize,
    ) -> Result<&mut Buffer, ParticleError> {
        self.insert(device, BufferKind::AtomicCounter, name, |device| {
            Buffer::with_usage::<u32>(device, item_count, BufferUsage::DynamicRead)
        })
    }

    /// Add a uniform buffer of `item_count` items of `T`.
    ///
    /// # Errors
    ///
    /// Fails when a uniform buffer of that name exists.
    pub fn add_uniform_buffer<T: Pod>(
        &mut self,
        device: &mut dyn GpuDevice,
        name: &str,
        item_count: usize,
    ) -> Result<&mut Buffer, ParticleError> {
        self.insert(device, BufferKind::Uniform, name, |device| {
            Buffer::with_usage::<T>(device, item_count, BufferUsage::DynamicDraw)
        })
    }

    /// Buffer of `kind` named `name`.
    #[must_use]
    pub fn get(&self, kind: BufferKind, name: &str) -> Option<&Buffer> {
        self.map(kind).get(name)
    }

    /// Mutable buffer of `kind` named `name`.
    pub fn get_mut(&mut self, kind: BufferKind, name: &str) -> Option<&mut Buffer> {
        self.map_mut(kind).get_mut(name)
    }

    /// Attribute buffer `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Buffer> {
        self.attributes.get(name)
    }

    /// Mutable attribute buffer `name`.
    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Buffer> {
        self.attributes.get_mut(name)
    }

    /// Atomic counter buffer `name`.
    #[must_use]
    pub fn atomic_counter(&self, name: &str) -> Option<&Buffer> {
        self.atomic_counters.get(name)
    }

    /// Mutable atomic counter buffer `name`.
    pub fn atomic_counter_mut(&mut self, name: &str) -> Option<&mut Buffer> {
        self.atomic_counters.get_mut(name)
    }

    /// Uniform buffer `name`.
    #[must_use]
    pub fn uniform_buffer(&self, name: &str) -> Option<&Buffer> {
        self.uniforms.get(name)
    }

    /// Mutable uniform buffer `name`.
    pub fn uniform_buffer_mut(&mut self, name: &str) -> Option<&mut Buffer> {
        self.uniforms.get_mut(name)
    }

    /// Names in `kind`'s map, in order.
    pub fn names(&self, kind: BufferKind) -> impl Iterator<Item = &str> {
        self.map(kind).keys().map(String::as_str)
    }

    /// Exchange which buffers two attribute names refer to. No data is
    /// copied. References obtained before the swap must be fetched again
    /// by name.
    ///
    /// # Errors
    ///
    /// Fails (and logs) when either name is unknown; nothing changes.
    pub fn swap_attributes(&mut self, first: &str, second: &str) -> Result<(), ParticleError> {
        for name in [first, second] {
            if !self.attributes.contains_key(name) {
                log::warn!(
                    "ParticleSystem: cannot swap attribute \"{name}\", which does not exist"
                );
                return Err(ParticleError::UnknownAttribute(name.to_owned()));
            }
        }
        if first == second {
            return Ok(());
        }
        if let (Some(a), Some(b)) = (
            self.attributes.remove(first),
            self.attributes.remove(second),
        ) {
            let _ = self.attributes.insert(first.to_owned(), b);
            let _ = self.attributes.insert(second.to_owned(), a);
        }
        Ok(())
    }

    /// Every buffer with its kind and name: attributes, then atomic
    /// counters, then uniforms, each in name order.
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (BufferKind, &str, &mut Buffer)> {
        let attributes = self
            .attributes
            .iter_mut()
            .map(|(name, buffer)| (BufferKind::Attribute, name.as_str(), buffer));
        let counters = self
            .atomic_counters
            .iter_mut()
            .map(|(name, buffer)| (BufferKind::AtomicCounter, name.as_str(), buffer));
        let uniforms = self
            .uniforms
            .iter_mut()
            .map(|(name, buffer)| (BufferKind::Uniform, name.as_str(), buffer));
        attributes.chain(counters).chain(uniforms)
    }

    pub(crate) fn release(&mut self, device: &mut dyn GpuDevice) {
        for map in [
            &mut self.attributes,
            &mut self.atomic_counters,
            &mut self.uniforms,
        ] {
            for (_, buffer) in std::mem::take(map) {
                buffer.release(device);
            }
        }
    }
}
