//! URL templates and the routing table
//!
//! Pages declare a URL template. The routing table maps observed URLs back to the page kind
//! whose template matches first, in registration order.

pub mod table;
pub mod template;

pub use table::{PageKind, RoutingTable, Validator};
pub use template::{UriVars, UrlTemplate, VarCodec};
