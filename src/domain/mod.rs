pub mod case;
pub mod case_xml;
pub mod credential;
pub mod params;
