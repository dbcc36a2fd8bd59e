//! PTP/MTP operation and response codes used by this workspace.
//!
//! Only the subset of the standard actually exercised by the protocol
//! engine and enumeration ladder is listed; vendor-specific codes are
//! passed through as opaque `u16`s by callers that need them.

/// `GetDeviceInfo`: returns the device's static capability description.
pub const GET_DEVICE_INFO: u16 = 0x1001;
/// `OpenSession`: begins a session, parameter 1 is the session ID.
pub const OPEN_SESSION: u16 = 0x1002;
/// `CloseSession`: ends the currently open session.
pub const CLOSE_SESSION: u16 = 0x1003;
/// `GetStorageIDs`: lists the storage IDs available on the device.
pub const GET_STORAGE_IDS: u16 = 0x1004;
/// `GetStorageInfo`: returns capacity/free/description for one storage.
pub const GET_STORAGE_INFO: u16 = 0x1005;
/// `GetObjectHandles`: lists object handles under a storage/parent.
pub const GET_OBJECT_HANDLES: u16 = 0x1007;
/// `GetObjectInfo`: returns metadata for a single object handle.
pub const GET_OBJECT_INFO: u16 = 0x1008;
/// `GetObject`: reads the full content of an object.
pub const GET_OBJECT: u16 = 0x1009;
/// `DeleteObject`: deletes an object by handle.
pub const DELETE_OBJECT: u16 = 0x100B;
/// `SendObjectInfo`: announces metadata ahead of a `SendObject`.
pub const SEND_OBJECT_INFO: u16 = 0x100C;
/// `SendObject`: writes the content of an object previously announced.
pub const SEND_OBJECT: u16 = 0x100D;
/// `GetPartialObject`: reads a byte range of an object.
pub const GET_PARTIAL_OBJECT: u16 = 0x101B;
/// `GetObjectPropList`: batch-metadata enumeration (MTP extension).
pub const GET_OBJECT_PROP_LIST: u16 = 0x9805;

/// `GetObjectPropList` property code: object's parent handle.
pub const PROP_PARENT_OBJECT: u16 = 0xDC0B;
/// `GetObjectPropList` property code: PTP object format.
pub const PROP_OBJECT_FORMAT: u16 = 0xDC02;
/// `GetObjectPropList` property code: object size in bytes.
pub const PROP_OBJECT_SIZE: u16 = 0xDC04;
/// `GetObjectPropList` property code: object's filename.
pub const PROP_OBJECT_FILE_NAME: u16 = 0xDC07;

/// `GetObjectPropList` element datatype: unsigned 16-bit integer.
pub const DATATYPE_UINT16: u16 = 0x0004;
/// `GetObjectPropList` element datatype: unsigned 32-bit integer.
pub const DATATYPE_UINT32: u16 = 0x0006;
/// `GetObjectPropList` element datatype: unsigned 64-bit integer.
pub const DATATYPE_UINT64: u16 = 0x0008;
/// `GetObjectPropList` element datatype: length-prefixed UTF-16LE string.
pub const DATATYPE_STRING: u16 = 0xFFFF;

/// `OK`: the command completed successfully.
pub const RESP_OK: u16 = 0x2001;
/// `OperationNotSupported`.
pub const RESP_OPERATION_NOT_SUPPORTED: u16 = 0x2005;
/// `ObjectNotFound`: the referenced handle does not exist.
pub const RESP_OBJECT_NOT_FOUND: u16 = 0x2009;
/// `StoreFull`: the target storage has insufficient free space.
pub const RESP_STORE_FULL: u16 = 0x200D;
/// `ObjectWriteProtected`: the target object/folder cannot be written.
pub const RESP_OBJECT_WRITE_PROTECTED: u16 = 0x2017;
/// `AccessDenied`: the device refused the operation.
pub const RESP_ACCESS_DENIED: u16 = 0x201D;
/// `SessionAlreadyOpen`: recoverable; another session is already open.
pub const RESP_SESSION_ALREADY_OPEN: u16 = 0x201E;

/// Interrupt-endpoint events carry this sentinel transaction ID when
/// they are not associated with any particular in-flight command.
pub const EVENT_TXID_NONE: u32 = 0xFFFF_FFFF;

/// `ObjectAdded` event code.
pub const EVENT_OBJECT_ADDED: u16 = 0x4002;
/// `ObjectRemoved` event code.
pub const EVENT_OBJECT_REMOVED: u16 = 0x4003;
/// `StoreFull` event code.
pub const EVENT_STORE_FULL: u16 = 0x400A;
/// `DeviceInfoChanged` event code.
pub const EVENT_DEVICE_INFO_CHANGED: u16 = 0x4008;

/// USB interface class for still-image/PTP devices.
pub const IFACE_CLASS_PTP_CAMERA: u8 = 0x06;
/// USB interface class used by vendor-specific (typically Android MTP)
/// devices that implement MTP without declaring the PTP class.
pub const IFACE_CLASS_VENDOR: u8 = 0xFF;
