mod end_to_end;

pub(crate) fn try_init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}
