//! Windows engine: capture via `xcap`, input via UI Automation's input
//! helpers, with raw `SendInput` where those have no primitive.

use async_trait::async_trait;
use tracing::debug;
use uiautomation::inputs::{Keyboard, Mouse};
use uiautomation::types::Point;

use super::DesktopEngine;
use crate::errors::AutomationError;
use crate::types::{MonitorInfo, ScreenshotResult};

pub struct WindowsEngine;

impl WindowsEngine {
    pub fn new() -> Result<Self, AutomationError> {
        Ok(Self)
    }
}

fn monitor_at(index: usize) -> Result<xcap::Monitor, AutomationError> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| AutomationError::PlatformError(format!("Failed to get monitors: {e}")))?;
    monitors.into_iter().nth(index).ok_or_else(|| {
        AutomationError::InvalidArgument(format!("no monitor with index {index}"))
    })
}

#[async_trait]
impl DesktopEngine for WindowsEngine {
    fn list_monitors(&self) -> Result<Vec<MonitorInfo>, AutomationError> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get monitors: {e}")))?;
        let mut infos = Vec::with_capacity(monitors.len());
        for (index, monitor) in monitors.into_iter().enumerate() {
            infos.push(MonitorInfo {
                index,
                name: monitor.name().map_err(|e| {
                    AutomationError::PlatformError(format!("Failed to get monitor name: {e}"))
                })?,
                x: monitor.x().map_err(|e| {
                    AutomationError::PlatformError(format!("Failed to get monitor x: {e}"))
                })?,
                y: monitor.y().map_err(|e| {
                    AutomationError::PlatformError(format!("Failed to get monitor y: {e}"))
                })?,
                width: monitor.width().map_err(|e| {
                    AutomationError::PlatformError(format!("Failed to get monitor width: {e}"))
                })?,
                height: monitor.height().map_err(|e| {
                    AutomationError::PlatformError(format!("Failed to get monitor height: {e}"))
                })?,
                is_primary: monitor.is_primary().map_err(|e| {
                    AutomationError::PlatformError(format!("Failed to get primary flag: {e}"))
                })?,
            });
        }
        Ok(infos)
    }

    async fn capture_monitor(&self, index: usize) -> Result<ScreenshotResult, AutomationError> {
        let monitor = monitor_at(index)?;
        let image = monitor
            .capture_image()
            .map_err(|e| AutomationError::PlatformError(format!("Failed to capture screen: {e}")))?;
        Ok(ScreenshotResult {
            width: image.width(),
            height: image.height(),
            image_data: image.into_raw(),
        })
    }

    fn click(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        debug!(x, y, "click");
        let mouse = Mouse::default();
        mouse
            .click(Point::new(x, y))
            .map_err(|e| AutomationError::PlatformError(e.to_string()))
    }

    fn move_mouse(&self, x: i32, y: i32) -> Result<(), AutomationError> {
        let mouse = Mouse::default();
        mouse
            .move_to(Point::new(x, y))
            .map_err(|e| AutomationError::PlatformError(e.to_string()))
    }

    fn scroll_wheel(&self, delta: i32, x: i32, y: i32) -> Result<(), AutomationError> {
        use windows::Win32::UI::Input::KeyboardAndMouse::{
            SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_WHEEL, MOUSEINPUT,
        };

        // One wheel notch per row.
        const WHEEL_DELTA: i32 = 120;

        self.move_mouse(x, y)?;
        let wheel_input = INPUT {
            r#type: INPUT_MOUSE,
            Anonymous: INPUT_0 {
                mi: MOUSEINPUT {
                    dx: 0,
                    dy: 0,
                    mouseData: (delta * WHEEL_DELTA) as u32,
                    dwFlags: MOUSEEVENTF_WHEEL,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        unsafe {
            SendInput(&[wheel_input], std::mem::size_of::<INPUT>() as i32);
        }
        Ok(())
    }

    fn press_key(&self, keys: &str) -> Result<(), AutomationError> {
        debug!(keys, "press key");
        let keyboard = Keyboard::default();
        keyboard
            .send_keys(keys)
            .map_err(|e| AutomationError::PlatformError(format!("Failed to press key: {e:?}")))
    }
}
