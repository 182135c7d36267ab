//! Native Windows backend: low-level keyboard hook, magnifier color effect,
//! cursor control, endpoint volume and workstation lock.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use windows::Win32::Foundation::{BOOL, LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
use windows::Win32::Media::Audio::{IMMDeviceEnumerator, MMDeviceEnumerator, eConsole, eRender};
use windows::Win32::System::Com::{CLSCTX_ALL, COINIT_MULTITHREADED, CoCreateInstance, CoInitializeEx, CoUninitialize};
use windows::Win32::System::Diagnostics::Debug::Beep;
use windows::Win32::System::Shutdown::LockWorkStation;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, KEYBD_EVENT_FLAGS, KEYBDINPUT, KEYEVENTF_KEYUP, SendInput, VIRTUAL_KEY,
};
use windows::Win32::UI::Magnification::{MAGCOLOREFFECT, MagInitialize, MagSetFullscreenColorEffect, MagUninitialize};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetCursorPos, GetMessageW, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, LLKHF_INJECTED, MSG,
    PostThreadMessageW, SetCursorPos, SetWindowsHookExW, UnhookWindowsHookEx, WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT,
    WM_SYSKEYDOWN,
};

use super::BackendOptions;
use super::command::{CommandLine, default_power_off_command};
use crate::intervention::{
    AlertTone, AudioOutput, AudioState, Backend, ColorFilter, ColorMatrix, EffectError, GrayscaleEffect,
    IDENTITY_MATRIX, InputDelayEffect, KeyDecision, KeyDelayFilter, KeyEvent, KeyInjector, KeyboardHook,
    PointerDevice, PointerInversionEffect, SessionControl,
};

pub fn backend(options: &BackendOptions) -> Backend {
    let power_off = options
        .power_off_command
        .as_deref()
        .and_then(CommandLine::from_argv)
        .or_else(default_power_off_command);
    Backend {
        name: "windows",
        audio: Arc::new(EndpointVolume),
        tone: Arc::new(BeepTone {
            repeats: options.tone_repeats,
        }),
        session: Arc::new(WindowsSession { power_off }),
        effects: vec![
            Box::new(InputDelayEffect::new(
                Box::new(LowLevelKeyboardHook::default()),
                Arc::new(SendInputInjector),
                options.key_delay,
            )),
            Box::new(GrayscaleEffect::new(Box::new(MagnifierColorFilter::default()))),
            Box::new(PointerInversionEffect::new(
                Arc::new(SystemCursor),
                options.pointer.clone(),
            )),
        ],
    }
}

pub struct WindowsSession {
    power_off: Option<CommandLine>,
}

#[async_trait]
impl SessionControl for WindowsSession {
    async fn lock(&self) -> Result<(), EffectError> {
        unsafe { LockWorkStation() }.map_err(|err| EffectError::platform("LockWorkStation", err))
    }

    async fn power_off(&self) -> Result<(), EffectError> {
        let command = self
            .power_off
            .as_ref()
            .ok_or(EffectError::Unsupported("power off"))?;
        command.run().await.map(|_| ())
    }
}

/// Default render endpoint via `IAudioEndpointVolume`.
pub struct EndpointVolume;

fn with_endpoint<T>(f: impl FnOnce(&IAudioEndpointVolume) -> windows::core::Result<T>) -> Result<T, EffectError> {
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(|err| EffectError::platform("CoInitializeEx", err))?;
        let result = (|| {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;
            let device = enumerator.GetDefaultAudioEndpoint(eRender, eConsole)?;
            let endpoint: IAudioEndpointVolume = device.Activate(CLSCTX_ALL, None)?;
            f(&endpoint)
        })();
        CoUninitialize();
        result.map_err(|err| EffectError::platform("audio endpoint", err))
    }
}

#[async_trait]
impl AudioOutput for EndpointVolume {
    async fn snapshot(&self) -> Result<AudioState, EffectError> {
        tokio::task::spawn_blocking(|| {
            with_endpoint(|endpoint| unsafe {
                Ok(AudioState {
                    volume: endpoint.GetMasterVolumeLevelScalar()?,
                    muted: endpoint.GetMute()?.as_bool(),
                })
            })
        })
        .await
        .map_err(|err| EffectError::Task(err.to_string()))?
    }

    async fn apply(&self, state: AudioState) -> Result<(), EffectError> {
        tokio::task::spawn_blocking(move || {
            with_endpoint(|endpoint| unsafe {
                endpoint.SetMasterVolumeLevelScalar(state.volume.clamp(0.0, 1.0), std::ptr::null())?;
                endpoint.SetMute(BOOL::from(state.muted), std::ptr::null())
            })
        })
        .await
        .map_err(|err| EffectError::Task(err.to_string()))?
    }
}

pub struct BeepTone {
    repeats: u32,
}

#[async_trait]
impl AlertTone for BeepTone {
    async fn play(&self) -> Result<(), EffectError> {
        let repeats = self.repeats.max(1);
        tokio::task::spawn_blocking(move || {
            for _ in 0..repeats {
                for (frequency, millis) in [(1000, 300), (1500, 300), (1000, 300)] {
                    unsafe { Beep(frequency, millis) }.map_err(|err| EffectError::platform("Beep", err))?;
                }
                std::thread::sleep(Duration::from_millis(200));
            }
            Ok(())
        })
        .await
        .map_err(|err| EffectError::Task(err.to_string()))?
    }
}

pub struct SystemCursor;

impl PointerDevice for SystemCursor {
    fn position(&self) -> Result<(i32, i32), EffectError> {
        let mut point = POINT::default();
        unsafe { GetCursorPos(&mut point) }.map_err(|err| EffectError::platform("GetCursorPos", err))?;
        Ok((point.x, point.y))
    }

    fn set_position(&self, x: i32, y: i32) -> Result<(), EffectError> {
        unsafe { SetCursorPos(x, y) }.map_err(|err| EffectError::platform("SetCursorPos", err))
    }
}

#[derive(Default)]
pub struct MagnifierColorFilter {
    initialized: bool,
}

fn to_mag_effect(matrix: &ColorMatrix) -> MAGCOLOREFFECT {
    let mut transform = [0.0f32; 25];
    for (row, values) in matrix.iter().enumerate() {
        transform[row * 5..row * 5 + 5].copy_from_slice(values);
    }
    MAGCOLOREFFECT { transform }
}

impl ColorFilter for MagnifierColorFilter {
    fn apply(&mut self, matrix: &ColorMatrix) -> Result<(), EffectError> {
        if !self.initialized {
            if !unsafe { MagInitialize() }.as_bool() {
                return Err(EffectError::platform("MagInitialize", "magnification API unavailable"));
            }
            self.initialized = true;
        }
        let effect = to_mag_effect(matrix);
        if !unsafe { MagSetFullscreenColorEffect(&effect) }.as_bool() {
            return Err(EffectError::platform("MagSetFullscreenColorEffect", "call failed"));
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), EffectError> {
        if !self.initialized {
            return Ok(());
        }
        let identity = to_mag_effect(&IDENTITY_MATRIX);
        let reset = unsafe { MagSetFullscreenColorEffect(&identity) }.as_bool();
        let uninit = unsafe { MagUninitialize() }.as_bool();
        self.initialized = false;
        if !(reset && uninit) {
            return Err(EffectError::platform("MagUninitialize", "failed to restore colors"));
        }
        Ok(())
    }
}

/// The hook procedure has no user pointer; the active filter lives here.
fn active_filter() -> &'static Mutex<Option<Arc<KeyDelayFilter>>> {
    static FILTER: OnceLock<Mutex<Option<Arc<KeyDelayFilter>>>> = OnceLock::new();
    FILTER.get_or_init(|| Mutex::new(None))
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION as i32 {
        let info = unsafe { &*(lparam.0 as *const KBDLLHOOKSTRUCT) };
        if (info.flags.0 & LLKHF_INJECTED.0) == 0 {
            let event = KeyEvent {
                vk: info.vkCode as u16,
                scan: info.scanCode as u16,
                pressed: matches!(wparam.0 as u32, WM_KEYDOWN | WM_SYSKEYDOWN),
            };
            let decision = active_filter()
                .lock()
                .ok()
                .and_then(|guard| guard.as_ref().map(|filter| filter.on_key(event)))
                .unwrap_or(KeyDecision::Pass);
            if decision == KeyDecision::Suppress {
                return LRESULT(1);
            }
        }
    }
    unsafe { CallNextHookEx(HHOOK::default(), code, wparam, lparam) }
}

/// `WH_KEYBOARD_LL` hook running its own message loop thread.
#[derive(Default)]
pub struct LowLevelKeyboardHook {
    thread: Option<(u32, JoinHandle<()>)>,
}

impl KeyboardHook for LowLevelKeyboardHook {
    fn install(&mut self, filter: Arc<KeyDelayFilter>) -> Result<(), EffectError> {
        if self.thread.is_some() {
            return Ok(());
        }
        if let Ok(mut slot) = active_filter().lock() {
            *slot = Some(filter);
        }

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32, String>>();
        let handle = std::thread::Builder::new()
            .name("vigil-keyboard-hook".to_string())
            .spawn(move || unsafe {
                let hook = match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), None, 0) {
                    Ok(hook) => hook,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(GetCurrentThreadId()));
                let mut msg = MSG::default();
                while GetMessageW(&mut msg, None, 0, 0).as_bool() {}
                let _ = UnhookWindowsHookEx(hook);
            })
            .map_err(|err| EffectError::platform("spawn hook thread", err))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                self.thread = Some((thread_id, handle));
                Ok(())
            }
            Ok(Err(message)) => {
                clear_active_filter();
                let _ = handle.join();
                Err(EffectError::platform("SetWindowsHookExW", message))
            }
            Err(err) => {
                clear_active_filter();
                Err(EffectError::platform("hook thread", err))
            }
        }
    }

    fn uninstall(&mut self) -> Result<(), EffectError> {
        clear_active_filter();
        let Some((thread_id, handle)) = self.thread.take() else {
            return Ok(());
        };
        unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }
            .map_err(|err| EffectError::platform("PostThreadMessageW", err))?;
        handle
            .join()
            .map_err(|_| EffectError::platform("hook thread", "panicked"))
    }
}

fn clear_active_filter() {
    if let Ok(mut slot) = active_filter().lock() {
        *slot = None;
    }
}

pub struct SendInputInjector;

impl KeyInjector for SendInputInjector {
    fn inject(&self, event: KeyEvent) -> Result<(), EffectError> {
        let flags = if event.pressed {
            KEYBD_EVENT_FLAGS(0)
        } else {
            KEYEVENTF_KEYUP
        };
        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(event.vk),
                    wScan: event.scan,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
        if sent == 1 {
            Ok(())
        } else {
            Err(EffectError::platform("SendInput", "input was blocked"))
        }
    }
}
