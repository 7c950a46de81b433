pub mod callback_registry;
