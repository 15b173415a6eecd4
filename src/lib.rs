// Bit-banged I2C master for the sumo robot's sensors
pub mod config;
pub mod gpio;
pub mod i2c;
pub mod messages;
pub mod timing;
