mod info_type;
pub use info_type::InfoType;
