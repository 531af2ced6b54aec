pub mod chat_area;
pub mod header;
pub mod input_bar;
