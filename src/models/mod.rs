pub mod saved_plant;

pub use saved_plant::SavedPlant;
