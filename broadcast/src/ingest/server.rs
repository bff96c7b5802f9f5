use std::cell::RefCell;
use std::rc::Rc;

/// A server the encoder can stream to
#[derive(PartialEq, Debug, Clone)]
pub struct IngestServer {
    pub server_name: String,
    pub server_url: String,
    pub is_default: bool,

    /// Upload throughput measured by the last ingest test, 0 if untested or the test failed
    pub bitrate_kbps: f32,
}

impl IngestServer {
    pub fn new(server_name: impl Into<String>, server_url: impl Into<String>) -> IngestServer {
        IngestServer {
            server_name: server_name.into(),
            server_url: server_url.into(),
            is_default: false,
            bitrate_kbps: 0.0,
        }
    }
}

/// The servers returned by ingest discovery
#[derive(PartialEq, Debug, Clone, Default)]
pub struct IngestList {
    pub servers: Vec<IngestServer>,
    pub default_server: Option<usize>,
}

/// The controller and the ingest tester both work on the same list, the tester writes its
/// measurements directly into it.
pub type SharedIngestList = Rc<RefCell<IngestList>>;

impl IngestList {
    /// Builds a list from discovered servers, using the first server flagged `is_default` as the
    /// default server.
    pub fn new(servers: Vec<IngestServer>) -> IngestList {
        let default_server = servers.iter().position(|server| server.is_default);
        IngestList {
            servers,
            default_server,
        }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn default_server(&self) -> Option<&IngestServer> {
        self.default_server.and_then(|index| self.servers.get(index))
    }

    pub fn server_by_name(&self, name: &str) -> Option<&IngestServer> {
        self.servers.iter().find(|server| server.server_name == name)
    }

    /// The server with the highest measured bitrate, if any server has been measured
    pub fn best_server(&self) -> Option<&IngestServer> {
        self.servers
            .iter()
            .filter(|server| server.bitrate_kbps > 0.0)
            .fold(None, |best: Option<&IngestServer>, server| match best {
                Some(current) if current.bitrate_kbps >= server.bitrate_kbps => Some(current),
                _ => Some(server),
            })
    }

    pub fn into_shared(self) -> SharedIngestList {
        Rc::new(RefCell::new(self))
    }
}
