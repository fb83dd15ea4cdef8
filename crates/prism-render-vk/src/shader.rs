// SPDX-License-Identifier: CEPL-1.0
use std::borrow::Cow;
use std::io::Cursor;
use std::path::PathBuf;

use ash::util::read_spv;
use ash::vk;
use tracing::info;

use crate::error::{VkError, VkResult, VkResultExt};

// Built from inline GLSL by build.rs.
pub const TRIANGLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
pub const TRIANGLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

/// Where a stage's SPIR-V comes from. The bytes are handed to the driver
/// verbatim.
#[derive(Clone, Debug)]
pub enum ShaderSource {
    Embedded {
        name: &'static str,
        bytes: &'static [u8],
    },
    File(PathBuf),
}

impl ShaderSource {
    pub fn triangle_vertex() -> Self {
        ShaderSource::Embedded {
            name: "tri.vert",
            bytes: TRIANGLE_VERT,
        }
    }

    pub fn triangle_fragment() -> Self {
        ShaderSource::Embedded {
            name: "tri.frag",
            bytes: TRIANGLE_FRAG,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ShaderSource::Embedded { name, .. } => (*name).to_string(),
            ShaderSource::File(path) => path.display().to_string(),
        }
    }

    pub fn bytes(&self) -> VkResult<Cow<'static, [u8]>> {
        match self {
            ShaderSource::Embedded { bytes, .. } => Ok(Cow::Borrowed(bytes)),
            ShaderSource::File(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|source| VkError::Shader {
                    name: self.name(),
                    source,
                }),
        }
    }

    /// The source decoded into SPIR-V words.
    pub fn words(&self) -> VkResult<Vec<u32>> {
        let bytes = self.bytes()?;
        read_spv(&mut Cursor::new(&bytes[..])).map_err(|source| VkError::Shader {
            name: self.name(),
            source,
        })
    }
}

pub struct ShaderModule {
    device: ash::Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    pub unsafe fn new(device: &ash::Device, source: &ShaderSource) -> VkResult<Self> {
        let code = source.words()?;
        let info = vk::ShaderModuleCreateInfo::default().code(&code);

        info!("Creating shader module \"{}\"", source.name());
        let module = device
            .create_shader_module(&info, None)
            .vk("vkCreateShaderModule")?;
        Ok(ShaderModule {
            device: device.clone(),
            module,
        })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn embedded_shaders_are_spirv() {
        for src in [ShaderSource::triangle_vertex(), ShaderSource::triangle_fragment()] {
            let words = src.words().unwrap();
            assert!(words.len() > 5, "{} is too short", src.name());
            assert_eq!(words[0], SPIRV_MAGIC);
        }
    }

    #[test]
    fn file_bytes_are_read_verbatim() {
        let path = std::env::temp_dir().join(format!("prism-shader-{}.spv", std::process::id()));
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000, 7, 0]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        std::fs::write(&path, &bytes).unwrap();

        let src = ShaderSource::File(path.clone());
        assert_eq!(&src.bytes().unwrap()[..], &bytes[..]);
        assert_eq!(src.words().unwrap(), vec![SPIRV_MAGIC, 0x0001_0000, 7, 0]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_a_shader_error() {
        let src = ShaderSource::File(PathBuf::from("/nonexistent/prism/none.spv"));
        match src.words() {
            Err(VkError::Shader { name, .. }) => assert!(name.ends_with("none.spv")),
            other => panic!("expected shader error, got {other:?}"),
        }
    }

    #[test]
    fn truncated_bytecode_is_rejected() {
        let src = ShaderSource::Embedded {
            name: "broken",
            bytes: &[0x03, 0x02, 0x23, 0x07, 0x00],
        };
        assert!(matches!(src.words(), Err(VkError::Shader { .. })));
    }
}
