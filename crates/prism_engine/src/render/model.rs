//! Meshes
//!
//! [`Builder`] is the CPU-side vertex and index data, deduplicated so that
//! corners sharing position, colour, normal and uv share one vertex.
//! [`Model`] is the immutable GPU copy of a builder, uploaded once through a
//! staging buffer into device-local memory.

use ash::{vk, Device};
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io::BufRead;
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;

use crate::render::vulkan::{Buffer, VulkanContext, VulkanError};

/// Mesh loading and upload errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to load OBJ: {0}")]
    Load(#[from] tobj::LoadError),

    #[error("Invalid mesh data: {0}")]
    InvalidFormat(String),

    #[error("Mesh needs at least 3 vertices, got {count}")]
    TooFewVertices { count: usize },

    #[error(transparent)]
    Vulkan(#[from] VulkanError),
}

/// Interleaved vertex as consumed by the vertex shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Field bits with -0.0 folded into 0.0, so corners that compare equal
    /// as floats hash and compare as one vertex
    fn bits(&self) -> [u32; 11] {
        let floats: &[f32; 11] = bytemuck::cast_ref(self);
        floats.map(|f| (f + 0.0).to_bits())
    }

    /// One interleaved binding at index 0
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    /// Locations 0..3: position, color, normal, uv
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, std::mem::offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, std::mem::offset_of!(Vertex, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, std::mem::offset_of!(Vertex, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, std::mem::offset_of!(Vertex, uv)),
        ]
    }
}

// Bitwise equality after zero folding so vertices can key a HashMap
impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// CPU-side mesh data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Builder {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Builder {
    /// Deduplicate a list of triangle corners into vertices plus indices
    pub fn from_triangle_list(corners: &[Vertex]) -> Self {
        let mut unique: HashMap<Vertex, u32> = HashMap::with_capacity(corners.len());
        let mut builder = Self {
            vertices: Vec::new(),
            indices: Vec::with_capacity(corners.len()),
        };

        for corner in corners {
            let index = *unique.entry(*corner).or_insert_with(|| {
                builder.vertices.push(*corner);
                (builder.vertices.len() - 1) as u32
            });
            builder.indices.push(index);
        }
        builder
    }

    /// Load and deduplicate an OBJ file
    pub fn load_obj<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let (models, _materials) = tobj::load_obj(path, &Self::load_options())?;
        let builder = Self::from_obj_models(&models)?;
        log::info!(
            "[MODEL] Loaded {:?}: {} vertices, {} indices",
            path,
            builder.vertices.len(),
            builder.indices.len()
        );
        Ok(builder)
    }

    /// Load and deduplicate OBJ data from a reader; material libraries are ignored
    pub fn load_obj_reader<R: BufRead>(reader: &mut R) -> Result<Self, ModelError> {
        let (models, _materials) = tobj::load_obj_buf(reader, &Self::load_options(), |_| Ok(Default::default()))?;
        Self::from_obj_models(&models)
    }

    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            triangulate: true,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        }
    }

    // Missing colours default to white, missing normals and uvs to zero
    fn from_obj_models(models: &[tobj::Model]) -> Result<Self, ModelError> {
        let mut corners = Vec::new();

        for model in models {
            let mesh = &model.mesh;
            let position_count = mesh.positions.len() / 3;

            for (corner, &position_index) in mesh.indices.iter().enumerate() {
                let p = position_index as usize;
                if p >= position_count {
                    return Err(ModelError::InvalidFormat(format!(
                        "Position index {} out of range in '{}'",
                        p, model.name
                    )));
                }

                let position = [mesh.positions[3 * p], mesh.positions[3 * p + 1], mesh.positions[3 * p + 2]];

                let color = if mesh.vertex_color.len() >= 3 * (p + 1) {
                    [mesh.vertex_color[3 * p], mesh.vertex_color[3 * p + 1], mesh.vertex_color[3 * p + 2]]
                } else {
                    [1.0, 1.0, 1.0]
                };

                let normal = mesh
                    .normal_indices
                    .get(corner)
                    .map(|&n| n as usize)
                    .filter(|&n| mesh.normals.len() >= 3 * (n + 1))
                    .map_or([0.0; 3], |n| {
                        [mesh.normals[3 * n], mesh.normals[3 * n + 1], mesh.normals[3 * n + 2]]
                    });

                let uv = mesh
                    .texcoord_indices
                    .get(corner)
                    .map(|&t| t as usize)
                    .filter(|&t| mesh.texcoords.len() >= 2 * (t + 1))
                    .map_or([0.0; 2], |t| [mesh.texcoords[2 * t], mesh.texcoords[2 * t + 1]]);

                corners.push(Vertex {
                    position,
                    color,
                    normal,
                    uv,
                });
            }
        }

        Ok(Self::from_triangle_list(&corners))
    }

    /// Expand indices back into the triangle corner list
    pub fn triangle_list(&self) -> Vec<Vertex> {
        self.indices
            .iter()
            .filter_map(|&index| self.vertices.get(index as usize).copied())
            .collect()
    }
}

/// GPU-resident mesh
pub struct Model {
    device: Device,
    vertex_buffer: Buffer,
    vertex_count: u32,
    index_buffer: Option<Buffer>,
    index_count: u32,
}

impl Model {
    /// Upload `builder` into device-local vertex and index buffers
    pub fn new(context: &VulkanContext, builder: &Builder) -> Result<Self, ModelError> {
        let vertex_count = builder.vertices.len();
        if vertex_count < 3 {
            return Err(ModelError::TooFewVertices { count: vertex_count });
        }

        let vertex_buffer = Self::upload(
            context,
            bytemuck::cast_slice(&builder.vertices),
            std::mem::size_of::<Vertex>() as vk::DeviceSize,
            vertex_count as u32,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        let index_buffer = if builder.indices.is_empty() {
            None
        } else {
            Some(Self::upload(
                context,
                bytemuck::cast_slice(&builder.indices),
                std::mem::size_of::<u32>() as vk::DeviceSize,
                builder.indices.len() as u32,
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?)
        };

        Ok(Self {
            device: context.device().clone(),
            vertex_buffer,
            vertex_count: vertex_count as u32,
            index_buffer,
            index_count: builder.indices.len() as u32,
        })
    }

    /// Load an OBJ file and upload it
    pub fn from_file<P: AsRef<Path>>(context: &VulkanContext, path: P) -> Result<Rc<Self>, ModelError> {
        let builder = Builder::load_obj(path)?;
        Ok(Rc::new(Self::new(context, &builder)?))
    }

    fn upload(
        context: &VulkanContext,
        bytes: &[u8],
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
    ) -> Result<Buffer, ModelError> {
        let mut staging = Buffer::new(
            context,
            instance_size,
            instance_count,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            1,
        )?;
        staging.map()?;
        staging.write_to_buffer(bytes, 0)?;

        let device_buffer = Buffer::new(
            context,
            instance_size,
            instance_count,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            1,
        )?;

        context.copy_buffer(staging.handle(), device_buffer.handle(), bytes.len() as vk::DeviceSize)?;
        Ok(device_buffer)
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, 0, &[self.vertex_buffer.handle()], &[0]);
            if let Some(index_buffer) = &self.index_buffer {
                self.device
                    .cmd_bind_index_buffer(command_buffer, index_buffer.handle(), 0, vk::IndexType::UINT32);
            }
        }
    }

    /// Indexed draw when an index buffer exists
    pub fn draw(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            if self.index_buffer.is_some() {
                self.device.cmd_draw_indexed(command_buffer, self.index_count, 1, 0, 0, 0);
            } else {
                self.device.cmd_draw(command_buffer, self.vertex_count, 1, 0, 0);
            }
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
