//! CoreAudio implementation of [`AudioSystemInterface`].
//!
//! Property listeners are registered with a boxed [`Registration`] as client
//! data. CoreAudio calls the trampoline on its own notification thread, which
//! is exactly the "native thread we do not control" the monitors expect.

use core_foundation::base::TCFType;
use core_foundation::string::{CFString, CFStringRef};
use coreaudio_sys::*;
use std::collections::HashMap;
use std::os::raw::c_void;
use std::ptr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::traits::{
    AudioSystemInterface, ListenerId, NativeCallback, PlaybackDevice, VolumeReading,
};
use crate::error::NativeError;

/// 'vmvc': the virtual main volume exposed by AudioHardwareService.
const VIRTUAL_MAIN_VOLUME: AudioObjectPropertySelector = 0x766d_7663;

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

struct Registration {
    object: AudioObjectID,
    addresses: Vec<AudioObjectPropertyAddress>,
    callback: NativeCallback,
}

pub struct CoreAudioSystem {
    registrations: Mutex<HashMap<ListenerId, Box<Registration>>>,
}

impl CoreAudioSystem {
    pub fn new() -> Self {
        detach_notification_run_loop();
        Self {
            registrations: Mutex::new(HashMap::new()),
        }
    }

    fn register(
        &self,
        object: AudioObjectID,
        addresses: Vec<AudioObjectPropertyAddress>,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError> {
        let registration = Box::new(Registration {
            object,
            addresses,
            callback,
        });
        let client_data = &*registration as *const Registration as *mut c_void;

        for (index, address) in registration.addresses.iter().enumerate() {
            let status = unsafe {
                AudioObjectAddPropertyListener(object, address, Some(property_listener), client_data)
            };
            if status != kAudioHardwareNoError as i32 {
                for added in &registration.addresses[..index] {
                    unsafe {
                        AudioObjectRemovePropertyListener(
                            object,
                            added,
                            Some(property_listener),
                            client_data,
                        );
                    }
                }
                return Err(status_error("AudioObjectAddPropertyListener", status));
            }
        }

        let id = ListenerId(NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed));
        self.registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, registration);
        debug!("Registered CoreAudio listener {:?} on object {}", id, object);
        Ok(id)
    }
}

impl Default for CoreAudioSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CoreAudioSystem {
    fn drop(&mut self) {
        let ids: Vec<ListenerId> = self
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        for id in ids {
            self.remove_listener(id);
        }
    }
}

impl AudioSystemInterface for CoreAudioSystem {
    fn default_playback_device(&self) -> Result<Option<PlaybackDevice>, NativeError> {
        let address = global_address(kAudioHardwarePropertyDefaultOutputDevice);
        let device_id: AudioDeviceID = get_property(kAudioObjectSystemObject, &address)?;
        if device_id == kAudioObjectUnknown {
            return Ok(None);
        }
        let name = device_name(device_id)?;
        Ok(Some(PlaybackDevice::new(device_id.to_string(), name)))
    }

    fn read_volume(&self, device: &PlaybackDevice) -> Result<VolumeReading, NativeError> {
        let id = device_id(device)?;
        let volume: f32 = get_property(id, &output_address(VIRTUAL_MAIN_VOLUME))?;
        let muted: u32 = get_property(id, &output_address(kAudioDevicePropertyMute))?;
        Ok(VolumeReading {
            volume_percent: (volume.clamp(0.0, 1.0) * 100.0).round() as u8,
            is_muted: muted != 0,
        })
    }

    fn write_volume(&self, device: &PlaybackDevice, percent: u8) -> Result<(), NativeError> {
        let scalar = f32::from(percent) / 100.0;
        set_property(device_id(device)?, &output_address(VIRTUAL_MAIN_VOLUME), &scalar)
    }

    fn write_mute(&self, device: &PlaybackDevice, muted: bool) -> Result<(), NativeError> {
        let value = u32::from(muted);
        set_property(device_id(device)?, &output_address(kAudioDevicePropertyMute), &value)
    }

    fn add_default_device_listener(
        &self,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError> {
        self.register(
            kAudioObjectSystemObject,
            vec![global_address(kAudioHardwarePropertyDefaultOutputDevice)],
            callback,
        )
    }

    fn add_volume_listener(
        &self,
        device: &PlaybackDevice,
        callback: NativeCallback,
    ) -> Result<ListenerId, NativeError> {
        self.register(
            device_id(device)?,
            vec![
                output_address(VIRTUAL_MAIN_VOLUME),
                output_address(kAudioDevicePropertyMute),
            ],
            callback,
        )
    }

    fn remove_listener(&self, id: ListenerId) {
        let registration = self
            .registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        let Some(registration) = registration else {
            return;
        };

        let client_data = &*registration as *const Registration as *mut c_void;
        for address in &registration.addresses {
            let status = unsafe {
                AudioObjectRemovePropertyListener(
                    registration.object,
                    address,
                    Some(property_listener),
                    client_data,
                )
            };
            if status != kAudioHardwareNoError as i32 {
                warn!("Failed to remove CoreAudio listener {:?}: {}", id, status);
            }
        }
        // HAL guarantees no callback is in flight once removal returns
        drop(registration);
    }
}

extern "C" fn property_listener(
    _in_object_id: AudioObjectID,
    _in_number_addresses: UInt32,
    _in_addresses: *const AudioObjectPropertyAddress,
    in_client_data: *mut c_void,
) -> OSStatus {
    if !in_client_data.is_null() {
        let registration = unsafe { &*(in_client_data as *const Registration) };
        (registration.callback)();
    }
    kAudioHardwareNoError as i32
}

/// Ask the HAL to deliver notifications on its own thread instead of the
/// main run loop, which this process never runs.
fn detach_notification_run_loop() {
    let address = global_address(kAudioHardwarePropertyRunLoop);
    let run_loop: *const c_void = ptr::null();
    if let Err(e) = set_property(kAudioObjectSystemObject, &address, &run_loop) {
        warn!("Could not detach CoreAudio notifications from the run loop: {}", e);
    }
}

fn global_address(selector: AudioObjectPropertySelector) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    }
}

fn output_address(selector: AudioObjectPropertySelector) -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: selector,
        mScope: kAudioDevicePropertyScopeOutput,
        mElement: kAudioObjectPropertyElementMain,
    }
}

fn device_id(device: &PlaybackDevice) -> Result<AudioDeviceID, NativeError> {
    device.id.parse().map_err(|_| NativeError::NoDevice)
}

fn status_error(call: &str, status: OSStatus) -> NativeError {
    if status == kAudioDevicePermissionsError as i32 {
        NativeError::PermissionDenied
    } else if status == kAudioHardwareBadObjectError as i32 {
        NativeError::NoDevice
    } else {
        NativeError::failed(format!("{} returned {}", call, status))
    }
}

fn get_property<T: Copy + Default>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
) -> Result<T, NativeError> {
    let mut value = T::default();
    let mut size = std::mem::size_of::<T>() as u32;
    let status = unsafe {
        AudioObjectGetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            &mut size,
            &mut value as *mut T as *mut c_void,
        )
    };
    if status != kAudioHardwareNoError as i32 {
        return Err(status_error("AudioObjectGetPropertyData", status));
    }
    Ok(value)
}

fn set_property<T>(
    object: AudioObjectID,
    address: &AudioObjectPropertyAddress,
    value: &T,
) -> Result<(), NativeError> {
    let status = unsafe {
        AudioObjectSetPropertyData(
            object,
            address,
            0,
            ptr::null(),
            std::mem::size_of::<T>() as u32,
            value as *const T as *const c_void,
        )
    };
    if status != kAudioHardwareNoError as i32 {
        return Err(status_error("AudioObjectSetPropertyData", status));
    }
    Ok(())
}

fn device_name(device_id: AudioDeviceID) -> Result<String, NativeError> {
    let address = global_address(kAudioDevicePropertyDeviceNameCFString);
    let mut size = std::mem::size_of::<CFStringRef>() as u32;
    let mut cf_string: CFStringRef = ptr::null();

    let status = unsafe {
        AudioObjectGetPropertyData(
            device_id,
            &address,
            0,
            ptr::null(),
            &mut size,
            &mut cf_string as *mut _ as *mut c_void,
        )
    };
    if status != kAudioHardwareNoError as i32 {
        return Err(status_error("AudioObjectGetPropertyData", status));
    }
    if cf_string.is_null() {
        return Err(NativeError::failed("device name is null"));
    }

    // The HAL hands out a +1 reference for this property
    let name = unsafe { CFString::wrap_under_create_rule(cf_string) };
    Ok(name.to_string())
}
