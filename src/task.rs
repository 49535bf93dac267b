use serde::de::DeserializeOwned;
use serde::Serialize;

/// A function that can run inside a worker process.
///
/// Closures cannot cross a process boundary, so `pmap` works on named tasks
/// instead: the parent sends `NAME`, the serialized `Args` and every serialized
/// `Input` to a worker, which looks the task up in its [`Registry`] and sends the
/// serialized `Output` back.
///
/// `Args` carries the extra arguments applied to every call. Use `()` when
/// there are none.
///
/// [`Registry`]: crate::Registry
pub trait Task {
    /// Stable name shared by the parent and the worker binary.
    const NAME: &'static str;
    type Input: Serialize + DeserializeOwned + Send;
    type Output: Serialize + DeserializeOwned + Send;
    type Args: Serialize + DeserializeOwned + Send + Sync;

    fn call(input: Self::Input, args: &Self::Args) -> anyhow::Result<Self::Output>;
}
