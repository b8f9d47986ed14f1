use padrelay_common::{tracing, Side};
use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::buttons;

// Linux input event constants
const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_ABS: u16 = 0x03;
const SYN_REPORT: u16 = 0x00;
const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;
const ABS_RX: u16 = 0x03;
const ABS_RY: u16 = 0x04;
const ABS_CNT: usize = 64;
const BUS_USB: u16 = 0x03;

// uinput ioctl constants
const UI_SET_EVBIT: libc::c_ulong = 0x40045564; // _IOW('U', 100, int)
const UI_SET_KEYBIT: libc::c_ulong = 0x40045565; // _IOW('U', 101, int)
const UI_SET_ABSBIT: libc::c_ulong = 0x40045567; // _IOW('U', 103, int)
const UI_DEV_CREATE: libc::c_ulong = 0x5501; // _IO('U', 1)
const UI_DEV_DESTROY: libc::c_ulong = 0x5502; // _IO('U', 2)

/// Native axis range of the virtual sticks
pub const AXIS_MIN: i32 = i16::MIN as i32;
pub const AXIS_MAX: i32 = i16::MAX as i32;

/// Errors raised by a virtual controller
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to open {path}: {source}. Ensure uinput is loaded and accessible")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("device setup failed: {0}")]
    Setup(&'static str),

    #[error("failed to write event: {0}")]
    Write(io::Error),

    #[error("unknown button '{0}'")]
    UnknownButton(String),
}

/// A virtual game controller that macros are played against
#[async_trait::async_trait]
pub trait Controller: Send + Sync {
    async fn press_button(&self, code: u16) -> Result<(), ControllerError>;
    async fn release_button(&self, code: u16) -> Result<(), ControllerError>;
    async fn set_joystick(&self, side: Side, x: f32, y: f32) -> Result<(), ControllerError>;
    /// Commit everything written since the last sync as one input frame
    async fn sync(&self) -> Result<(), ControllerError>;
}

/// Creates one controller per client session
#[async_trait::async_trait]
pub trait ControllerFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn Controller>, ControllerError>;
}

/// Linux input_event structure
#[repr(C)]
struct InputEvent {
    time: libc::timeval,
    type_: u16,
    code: u16,
    value: i32,
}

/// uinput_user_dev structure for device setup
#[repr(C)]
struct UinputUserDev {
    name: [u8; 80],
    id: InputId,
    ff_effects_max: u32,
    absmax: [i32; ABS_CNT],
    absmin: [i32; ABS_CNT],
    absfuzz: [i32; ABS_CNT],
    absflat: [i32; ABS_CNT],
}

#[repr(C)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

/// Map a stick position in [-1, 1] linearly onto the device axis range
pub fn map_axis(value: f32) -> i32 {
    let slope = (AXIS_MAX - AXIS_MIN) as f32 / 2.0;
    let output = AXIS_MIN as f32 + slope * (value + 1.0);
    (output as i32).clamp(AXIS_MIN, AXIS_MAX)
}

/// uinput-backed gamepad. The virtual device is destroyed when this is dropped.
pub struct UinputController {
    file: File,
}

impl UinputController {
    /// Create and register a virtual gamepad through `uinput_path`
    pub async fn create(uinput_path: &Path, device_name: &str) -> Result<Self, ControllerError> {
        info!("Creating uinput virtual controller '{}'", device_name);

        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(uinput_path)
            .map_err(|source| {
                error!("Failed to open {}: {}", uinput_path.display(), source);
                ControllerError::Open {
                    path: uinput_path.to_path_buf(),
                    source,
                }
            })?;
        let fd = file.as_raw_fd();

        unsafe {
            if libc::ioctl(fd, UI_SET_EVBIT as _, EV_KEY as libc::c_int) < 0 {
                return Err(ControllerError::Setup("failed to set EV_KEY bit"));
            }
            for (name, code) in buttons::BUTTONS {
                if libc::ioctl(fd, UI_SET_KEYBIT as _, *code as libc::c_int) < 0 {
                    error!("Failed to set keybit for button {}", name);
                }
            }

            if libc::ioctl(fd, UI_SET_EVBIT as _, EV_ABS as libc::c_int) < 0 {
                return Err(ControllerError::Setup("failed to set EV_ABS bit"));
            }
            for axis in [ABS_X, ABS_Y, ABS_RX, ABS_RY] {
                if libc::ioctl(fd, UI_SET_ABSBIT as _, axis as libc::c_int) < 0 {
                    error!("Failed to set abs bit for axis {}", axis);
                }
            }
        }

        let mut dev: UinputUserDev = unsafe { mem::zeroed() };
        let name = device_name.as_bytes();
        // Keep room for the terminating NUL
        let len = name.len().min(dev.name.len() - 1);
        dev.name[..len].copy_from_slice(&name[..len]);
        dev.id.bustype = BUS_USB;
        dev.id.vendor = 0x3;
        dev.id.product = 0x3;
        dev.id.version = 2;
        for axis in [ABS_X, ABS_Y, ABS_RX, ABS_RY] {
            dev.absmin[axis as usize] = AXIS_MIN;
            dev.absmax[axis as usize] = AXIS_MAX;
        }

        unsafe {
            let dev_ptr = &dev as *const UinputUserDev as *const libc::c_void;
            if libc::write(fd, dev_ptr, mem::size_of::<UinputUserDev>()) < 0 {
                return Err(ControllerError::Setup("failed to write uinput device structure"));
            }
            if libc::ioctl(fd, UI_DEV_CREATE as _) < 0 {
                return Err(ControllerError::Setup("failed to create uinput device"));
            }
        }

        // Small delay to let the device settle
        sleep(Duration::from_millis(100)).await;

        info!("Created virtual controller '{}'", device_name);
        Ok(Self { file })
    }

    fn write_event(&self, type_: u16, code: u16, value: i32) -> Result<(), ControllerError> {
        let mut event: InputEvent = unsafe { mem::zeroed() };
        unsafe {
            libc::gettimeofday(&mut event.time, std::ptr::null_mut());
        }
        event.type_ = type_;
        event.code = code;
        event.value = value;

        let written = unsafe {
            libc::write(
                self.file.as_raw_fd(),
                &event as *const InputEvent as *const libc::c_void,
                mem::size_of::<InputEvent>(),
            )
        };
        if written != mem::size_of::<InputEvent>() as isize {
            return Err(ControllerError::Write(io::Error::last_os_error()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Controller for UinputController {
    async fn press_button(&self, code: u16) -> Result<(), ControllerError> {
        self.write_event(EV_KEY, code, 1)
    }

    async fn release_button(&self, code: u16) -> Result<(), ControllerError> {
        self.write_event(EV_KEY, code, 0)
    }

    async fn set_joystick(&self, side: Side, x: f32, y: f32) -> Result<(), ControllerError> {
        let (x_axis, y_axis) = match side {
            Side::Left => (ABS_X, ABS_Y),
            Side::Right => (ABS_RX, ABS_RY),
        };
        self.write_event(EV_ABS, x_axis, map_axis(x))?;
        self.write_event(EV_ABS, y_axis, map_axis(y))
    }

    async fn sync(&self) -> Result<(), ControllerError> {
        self.write_event(EV_SYN, SYN_REPORT, 0)
    }
}

impl Drop for UinputController {
    fn drop(&mut self) {
        debug!("Destroying uinput virtual controller");
        unsafe {
            if libc::ioctl(self.file.as_raw_fd(), UI_DEV_DESTROY as _) < 0 {
                error!("Failed to destroy device: {}", io::Error::last_os_error());
            }
        }
    }
}

/// Opens a fresh uinput gamepad for every session
pub struct UinputFactory {
    pub uinput_path: PathBuf,
    pub device_name: String,
}

#[async_trait::async_trait]
impl ControllerFactory for UinputFactory {
    async fn open(&self) -> Result<Arc<dyn Controller>, ControllerError> {
        let controller = UinputController::create(&self.uinput_path, &self.device_name).await?;
        Ok(Arc::new(controller))
    }
}
