mod locations;
mod traffic_data;
mod traffic_data_clean;
