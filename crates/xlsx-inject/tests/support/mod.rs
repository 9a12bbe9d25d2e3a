pub mod template_builder;
