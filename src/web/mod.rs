// Web layer: the REST API, the /ws peer-transport upgrade, and the HTML
// explorer. Types stay namespaced under `web` rather than re-exported.

pub mod explorer;
pub mod handlers;
pub mod models;
pub mod server;
