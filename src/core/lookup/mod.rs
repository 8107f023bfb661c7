pub mod array_finger_table;
pub mod finger_table;
pub mod successor_list;
