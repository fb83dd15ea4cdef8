// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkError {
    /// A Vulkan entry point returned an error code.
    #[error("{call} failed: {result}")]
    Call {
        call: &'static str,
        result: vk::Result,
    },

    #[error("no compatible graphics device ({candidates} enumerated)")]
    NoCompatibleDevice { candidates: usize },

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("present mode {0:?} is not supported by the surface")]
    PresentModeUnsupported(vk::PresentModeKHR),

    /// The presentation chain no longer matches its surface.
    #[error("presentation chain is out of date; rebuild required")]
    OutOfDate,

    #[error("acquired image index {index} outside chain of {count} images")]
    ImageIndexOutOfRange { index: u32, count: usize },

    /// A frame slot's fence or acquire semaphore could not be restored
    /// after a failed submission.
    #[error("frame slot synchronization could not be restored")]
    FrameSlotLost,

    #[error("presentation chain has no framebuffers; attach a render pass first")]
    RenderPassMissing,

    #[error("shader bytecode `{name}`: {source}")]
    Shader {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("window handle unavailable: {0}")]
    Window(#[from] raw_window_handle::HandleError),
}

impl VkError {
    /// True for conditions the frame loop can report and survive.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VkError::OutOfDate)
    }
}

pub type VkResult<T> = std::result::Result<T, VkError>;

/// Attaches the failing entry point's name to a raw `vk::Result`.
pub trait VkResultExt<T> {
    fn vk(self, call: &'static str) -> VkResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn vk(self, call: &'static str) -> VkResult<T> {
        self.map_err(|result| VkError::Call { call, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_out_of_date_is_recoverable() {
        assert!(VkError::OutOfDate.is_recoverable());
        assert!(!VkError::NoCompatibleDevice { candidates: 2 }.is_recoverable());
        assert!(!VkError::ImageIndexOutOfRange { index: 5, count: 3 }.is_recoverable());
        assert!(!VkError::FrameSlotLost.is_recoverable());
    }

    #[test]
    fn window_handle_errors_keep_their_source() {
        let err = VkError::from(raw_window_handle::HandleError::Unavailable);
        assert!(matches!(err, VkError::Window(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn call_errors_name_the_entry_point() {
        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = r.vk("vkQueueSubmit").unwrap_err();
        assert!(err.to_string().starts_with("vkQueueSubmit failed"));
    }
}
