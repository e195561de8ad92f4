use std::mem::size_of;
use std::time::Duration;

use blueclick_types::Point;
use windows::Win32::Foundation::{HWND, POINT};
use windows::Win32::System::Diagnostics::Debug::Beep;
use windows::Win32::System::Threading::{AttachThreadInput, GetCurrentThreadId};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    BlockInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBD_EVENT_FLAGS, KEYBDINPUT,
    KEYEVENTF_KEYUP, MOUSE_EVENT_FLAGS, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEINPUT,
    SendInput, SetActiveWindow, SetFocus, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    BringWindowToTop, GetCursorPos, GetForegroundWindow, GetWindowThreadProcessId, IsWindow,
    SetCursorPos, SetForegroundWindow,
};

use crate::{InputDriver, InputError, VirtualKey, WindowHandle};

fn os_error(call: &'static str, error: windows::core::Error) -> InputError {
    InputError::Os {
        call,
        message: error.message(),
    }
}

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut _)
}

fn mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn key_input(key: VirtualKey, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(key.code()),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send(call: &'static str, inputs: &[INPUT]) -> Result<(), InputError> {
    let sent = unsafe { SendInput(inputs, size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(InputError::Partial {
            call,
            sent,
            expected: inputs.len() as u32,
        });
    }
    Ok(())
}

/// `SendInput` based driver for the interactive desktop
#[derive(Debug, Default)]
pub struct Win32Driver;

impl Win32Driver {
    pub fn new() -> Self {
        Self
    }
}

impl InputDriver for Win32Driver {
    fn cursor_position(&self) -> Result<Point, InputError> {
        let mut pos = POINT::default();
        unsafe { GetCursorPos(&mut pos) }.map_err(|e| os_error("GetCursorPos", e))?;
        Ok(Point::new(pos.x, pos.y))
    }

    fn move_cursor(&self, to: Point) -> Result<(), InputError> {
        unsafe { SetCursorPos(to.x, to.y) }.map_err(|e| os_error("SetCursorPos", e))
    }

    fn left_click(&self) -> Result<(), InputError> {
        send(
            "SendInput(click)",
            &[
                mouse_input(MOUSEEVENTF_LEFTDOWN),
                mouse_input(MOUSEEVENTF_LEFTUP),
            ],
        )
    }

    fn press_key(&self, key: VirtualKey) -> Result<(), InputError> {
        send(
            "SendInput(key)",
            &[
                key_input(key, KEYBD_EVENT_FLAGS(0)),
                key_input(key, KEYEVENTF_KEYUP),
            ],
        )
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        let window = unsafe { GetForegroundWindow() };
        (!window.is_invalid()).then(|| WindowHandle(window.0 as isize))
    }

    fn restore_focus(&self, window: WindowHandle) -> Result<(), InputError> {
        let target = hwnd(window);
        if !unsafe { IsWindow(Some(target)) }.as_bool() {
            tracing::debug!("Window {:?} is gone, not restoring focus", window);
            return Ok(());
        }

        // SetForegroundWindow is refused unless our thread shares input state
        // with the current foreground thread
        unsafe {
            let current = GetCurrentThreadId();
            let foreground = GetWindowThreadProcessId(GetForegroundWindow(), None);
            let attached = foreground != 0
                && foreground != current
                && AttachThreadInput(current, foreground, true).as_bool();

            let _ = BringWindowToTop(target);
            let raised = SetForegroundWindow(target).as_bool();
            let _ = SetActiveWindow(target);
            let _ = SetFocus(Some(target));

            if attached {
                let _ = AttachThreadInput(current, foreground, false);
            }

            if !raised {
                tracing::warn!("SetForegroundWindow refused for {:?}", window);
            }
        }
        Ok(())
    }

    fn block_input(&self, blocked: bool) -> Result<(), InputError> {
        unsafe { BlockInput(blocked) }.map_err(|e| os_error("BlockInput", e))
    }

    fn beep(&self, frequency: u32, duration: Duration) -> Result<(), InputError> {
        unsafe { Beep(frequency, duration.as_millis() as u32) }.map_err(|e| os_error("Beep", e))
    }
}
