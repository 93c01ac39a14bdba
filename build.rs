fn main() {
    // Only emit ESP-IDF link/env metadata when building for the device.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
