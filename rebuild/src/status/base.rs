/// Receives the ordered run status labels, such as `gathering data` or `finished loading data`.
///
/// The coordinator publishes a label at every major phase change of a run and ends with either
/// `succeeded` or `failed`.
pub trait StatusSink: Send + Sync {
    fn set_status(&self, label: &str);
}
