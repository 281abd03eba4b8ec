pub mod shared {
    pub mod bounding_box;
    pub mod constants;
    pub mod frame;
    pub mod frame_normalizer;
    pub mod model_resolver;
}

pub mod capture {
    pub mod domain {
        pub mod capture_lease;
        pub mod capture_provider;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod detector_provider;
        pub mod face_detector;
        pub mod object_detector;
        pub mod restricted_object_policy;
    }
    pub mod infrastructure;
}

pub mod focus {
    pub mod focus_event;
    pub mod focus_event_bus;
}

pub mod proctoring {
    pub mod activity_outcome;
    #[cfg(test)]
    pub(crate) mod fakes;
    pub mod monitor;
    pub mod monitor_config;
    pub mod sampler;
    pub mod session;
    pub mod session_logger;
    pub mod tick_scheduler;
    pub mod violation;
    pub mod violation_sink;
}
