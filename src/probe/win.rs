use anyhow::{anyhow, Result};
use tracing::error;
use windows::Win32::{
    System::SystemInformation::GetTickCount64,
    UI::Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
};

use super::InputSource;

pub fn get_ms_since_input() -> Result<u32> {
    let mut last: LASTINPUTINFO = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        error!("Failed to retrieve last input time");
        return Err(anyhow!("Failed to retrieve last input time"));
    }

    let tick_count = unsafe { GetTickCount64() };
    let duration = tick_count - last.dwTime as u64;
    if duration > u32::MAX as u64 {
        Ok(u32::MAX)
    } else {
        Ok(duration as u32)
    }
}

pub struct WindowsInputSource {}

impl WindowsInputSource {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsInputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for WindowsInputSource {
    fn ms_since_input(&mut self) -> Result<u32> {
        get_ms_since_input().inspect_err(|e| error!("Failed to get last input time {e:?}"))
    }
}
