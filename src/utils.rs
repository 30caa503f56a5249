use std::any::Any;
use std::sync::Arc;

use crate::SharedError;

pub(crate) fn share<E: Into<anyhow::Error>>(err: E) -> SharedError {
    Arc::new(err.into())
}

/// Best-effort text of a panic payload, as the default panic hook prints it.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::{panic_message, share};
    use std::io::{Error as IOErr, ErrorKind};
    use std::panic;

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static message");

        let code = 7;
        let payload = panic::catch_unwind(|| panic!("formatted {code}")).unwrap_err();
        assert_eq!(panic_message(&*payload), "formatted 7");

        let payload = panic::catch_unwind(|| panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(&*payload), "Box<dyn Any>");
    }

    #[test]
    fn test_share_keeps_source() {
        let err = share(IOErr::new(ErrorKind::NotFound, "missing"));
        let io = err.downcast_ref::<IOErr>().unwrap();
        assert_eq!(io.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "missing");
    }
}
