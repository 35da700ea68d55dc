//! Descriptor set layouts, pools and writers
//!
//! Layouts keep their binding table so [`DescriptorWriter`] can reject
//! writes that do not match it before anything reaches the driver.

use ash::{vk, Device};
use std::collections::BTreeMap;

use super::{VulkanError, VulkanResult};

/// Binding number -> layout binding
pub type BindingTable = BTreeMap<u32, vk::DescriptorSetLayoutBinding>;

/// Fluent description of a descriptor set layout
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: BindingTable,
    duplicates: Vec<u32>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        let layout_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(count)
            .stage_flags(stage_flags)
            .build();
        if self.bindings.insert(binding, layout_binding).is_some() {
            self.duplicates.push(binding);
        }
        self
    }

    /// Add a single uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags, 1)
    }

    /// Add a single combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add_binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags, 1)
    }

    /// Fails if any binding number was added twice
    pub fn validate(&self) -> VulkanResult<()> {
        match self.duplicates.first() {
            Some(binding) => Err(VulkanError::invalid(format!("Binding {} already in use", binding))),
            None => Ok(()),
        }
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        self.validate()?;

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = self.bindings.values().copied().collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;
        log::debug!("[DESCRIPTORS] Created set layout with {} binding(s)", bindings.len());

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: BindingTable,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Fluent description of a descriptor pool
pub struct DescriptorPoolBuilder {
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    max_sets: u32,
    pool_flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            pool_sizes: Vec::new(),
            max_sets: 1000,
            pool_flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl DescriptorPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool_size(mut self, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(vk::DescriptorPoolSize {
            ty: descriptor_type,
            descriptor_count: count,
        });
        self
    }

    pub fn pool_flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.pool_flags = flags;
        self
    }

    pub fn max_sets(mut self, count: u32) -> Self {
        self.max_sets = count;
        self
    }

    pub fn build(self, device: &Device) -> VulkanResult<DescriptorPool> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&self.pool_sizes)
            .max_sets(self.max_sets)
            .flags(self.pool_flags);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorPool {
            pool,
            device: device.clone(),
        })
    }
}

/// Descriptor pool; never grows, exhaustion is an error
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Allocate one set with `layout`
    pub fn allocate_descriptor(&self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(|e| {
            log::error!("[DESCRIPTORS] Descriptor set allocation failed: {:?}", e);
            VulkanError::Api(e)
        })?;

        sets.into_iter()
            .next()
            .ok_or_else(|| VulkanError::invalid("Driver returned no descriptor set"))
    }

    /// Requires a pool built with `FREE_DESCRIPTOR_SET`
    pub fn free_descriptors(&self, descriptors: &[vk::DescriptorSet]) -> VulkanResult<()> {
        unsafe { self.device.free_descriptor_sets(self.pool, descriptors) }.map_err(VulkanError::Api)
    }

    /// Return every allocated set to the pool
    pub fn reset_pool(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty()) }
            .map_err(VulkanError::Api)
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum PendingWrite {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// Collects writes for one set, validated against the layout's bindings
pub struct DescriptorWriter<'a> {
    bindings: &'a BindingTable,
    writes: Vec<(u32, vk::DescriptorType, PendingWrite)>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self::from_bindings(layout.bindings())
    }

    pub fn from_bindings(bindings: &'a BindingTable) -> Self {
        Self {
            bindings,
            writes: Vec::new(),
        }
    }

    fn binding_type(&self, binding: u32) -> VulkanResult<vk::DescriptorType> {
        let description = self
            .bindings
            .get(&binding)
            .ok_or_else(|| VulkanError::invalid(format!("Layout does not contain binding {}", binding)))?;
        if description.descriptor_count != 1 {
            return Err(VulkanError::invalid(format!(
                "Binding {} is an array of {}; single-descriptor write expected",
                binding, description.descriptor_count
            )));
        }
        Ok(description.descriptor_type)
    }

    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> VulkanResult<Self> {
        let ty = self.binding_type(binding)?;
        if !matches!(
            ty,
            vk::DescriptorType::UNIFORM_BUFFER
                | vk::DescriptorType::STORAGE_BUFFER
                | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
                | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
        ) {
            return Err(VulkanError::invalid(format!("Binding {} ({:?}) is not a buffer", binding, ty)));
        }
        self.writes.push((binding, ty, PendingWrite::Buffer(info)));
        Ok(self)
    }

    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> VulkanResult<Self> {
        let ty = self.binding_type(binding)?;
        if !matches!(
            ty,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
                | vk::DescriptorType::SAMPLED_IMAGE
                | vk::DescriptorType::STORAGE_IMAGE
        ) {
            return Err(VulkanError::invalid(format!("Binding {} ({:?}) is not an image", binding, ty)));
        }
        self.writes.push((binding, ty, PendingWrite::Image(info)));
        Ok(self)
    }

    /// Number of writes collected so far
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Allocate a set with `layout` from `pool` and apply the writes
    pub fn build(self, pool: &DescriptorPool, layout: &DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let set = pool.allocate_descriptor(layout.handle())?;
        self.overwrite(pool.device(), set);
        Ok(set)
    }

    /// Apply the writes to an existing set
    pub fn overwrite(&self, device: &Device, set: vk::DescriptorSet) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|(binding, ty, pending)| {
                let write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(*ty);
                match pending {
                    PendingWrite::Buffer(info) => write.buffer_info(std::slice::from_ref(info)).build(),
                    PendingWrite::Image(info) => write.image_info(std::slice::from_ref(info)).build(),
                }
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS)
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
    }

    fn buffer_info() -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: vk::Buffer::null(),
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }

    #[test]
    fn test_builder_orders_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        assert!(builder.validate().is_ok());
        let keys: Vec<u32> = builder.bindings().keys().copied().collect();
        assert_eq!(keys, vec![0, 1]);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let builder = scene_builder().add_uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT);
        assert!(matches!(builder.validate(), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_writer_accepts_matching_bindings() {
        let builder = scene_builder();
        let image_info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        };
        let writer = DescriptorWriter::from_bindings(builder.bindings())
            .write_buffer(0, buffer_info())
            .and_then(|writer| writer.write_image(1, image_info))
            .expect("valid writes");
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn test_writer_rejects_unknown_binding() {
        let builder = scene_builder();
        let result = DescriptorWriter::from_bindings(builder.bindings()).write_buffer(5, buffer_info());
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_writer_rejects_type_mismatch() {
        let builder = scene_builder();
        let result = DescriptorWriter::from_bindings(builder.bindings()).write_buffer(1, buffer_info());
        assert!(result.is_err());
    }

    #[test]
    fn test_writer_rejects_array_binding() {
        let builder = DescriptorSetLayoutBuilder::new().add_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
            4,
        );
        let result = DescriptorWriter::from_bindings(builder.bindings()).write_buffer(0, buffer_info());
        assert!(result.is_err());
    }
}
