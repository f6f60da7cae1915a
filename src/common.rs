pub(crate) mod time;

#[cfg(feature = "logging")]
pub(crate) fn name_prefix(name: Option<&str>) -> String {
    name.map(|name| format!("[{name}] ")).unwrap_or_default()
}

/// Extracts a readable message from a panic payload, if it carries one.
#[cfg(feature = "logging")]
pub(crate) fn panic_message<'a>(
    payload: &'a (dyn std::any::Any + Send + 'static),
) -> Option<std::borrow::Cow<'a, str>> {
    // NOTE: Clippy will complain if we use `if let Some(_)` here.
    // https://rust-lang.github.io/rust-clippy/master/index.html#manual_map
    (payload.downcast_ref::<&str>().map(|s| (*s).into()))
        .or_else(|| payload.downcast_ref::<String>().map(Into::into))
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::{name_prefix, panic_message};

    use std::panic::catch_unwind;

    #[test]
    fn panic_message_from_payload() {
        let payload = catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(&*payload).as_deref(), Some("static message"));

        let code = 42;
        let payload = catch_unwind(|| panic!("formatted {code}")).unwrap_err();
        assert_eq!(panic_message(&*payload).as_deref(), Some("formatted 42"));

        let payload = catch_unwind(|| std::panic::panic_any(7_u32)).unwrap_err();
        assert_eq!(panic_message(&*payload), None);
    }

    #[test]
    fn name_prefix_wraps_the_name() {
        assert_eq!(name_prefix(Some("requests")), "[requests] ");
        assert_eq!(name_prefix(None), "");
    }
}
