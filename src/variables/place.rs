use std::fmt::{self, Display};

/// Where a caller's tensor lives.
///
/// The dense table always keeps its buffers in host memory, the place only tags
/// which device a worker is pulling to or pushing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Place {
    #[default]
    Cpu,
    Device(usize),
}

impl Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Cpu => f.write_str("cpu"),
            Place::Device(id) => write!(f, "device:{id}"),
        }
    }
}
