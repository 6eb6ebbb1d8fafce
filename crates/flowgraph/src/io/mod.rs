//! Persistence for flow graphs.

pub mod graph_file;

pub use graph_file::{
    load_graph, load_graph_from_path, save_graph, save_graph_to_path, save_graph_v1,
    to_json_string,
};
