pub mod detection_worker;
