//! In-process caches feeding the label pipeline: template values (for
//! community expansion) and label values (for metric sample assembly).

pub mod label;
pub mod template;

pub use label::LabelStorage;
pub use template::TemplateStorage;
