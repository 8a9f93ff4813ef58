use crate::Error;
use crate::RemoteError;

#[test]
fn test_wire_codes_map_to_named_conditions() {
    assert_eq!(RemoteError::from_code("ENOENT"), RemoteError::NotFound);
    assert_eq!(RemoteError::from_code("EAGAIN"), RemoteError::Conflict);
    assert_eq!(RemoteError::from_code("EPERM"), RemoteError::PermissionDenied);
    assert_eq!(RemoteError::from_code("EACCES"), RemoteError::PermissionDenied);
    assert_eq!(
        RemoteError::from_code("EWHATEVER"),
        RemoteError::Unknown("EWHATEVER".to_string())
    );
}

#[test]
fn test_code_is_inverse_of_from_code() {
    for code in [
        "ENOENT", "EACCES", "EEXIST", "EINVAL", "E2BIG", "ENOSPC", "EROFS", "ENAMETOOLONG", "EAGAIN",
        "EISDIR", "ENOTEMPTY", "EBUSY", "ENOMEM", "EIO", "ENOSYS", "EISCONN", "EODD",
    ] {
        assert_eq!(RemoteError::from_code(code).code(), code);
    }
}

#[test]
fn test_only_remote_conflict_is_a_conflict() {
    assert!(Error::Remote(RemoteError::Conflict).is_conflict());
    assert!(!Error::Remote(RemoteError::Busy).is_conflict());
    assert!(!Error::RetriesExhausted(3).is_conflict());
}
