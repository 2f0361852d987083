pub mod transcript {
    pub mod domain {
        pub mod text_edit;
        pub mod transcript;
        pub mod transcript_segment;
    }
}

pub mod editing {
    pub mod domain {
        pub mod edit_plan;
        pub mod edit_resolver;
    }
}

pub mod synthesis {
    pub mod domain {
        pub mod audio_decoder;
        pub mod speech_provider;
        pub mod synthesis_cache;
        pub mod synthesis_gateway;
        pub mod synthesis_result;
        pub mod voice_profile;
    }
    pub mod infrastructure;
}

pub mod timeline {
    pub mod domain {
        pub mod reconciled_timeline;
        pub mod timeline_reconciler;
    }
}

pub mod audio {
    pub mod domain {
        pub mod audio_buffer;
        pub mod audio_resampler;
        pub mod audio_splicer;
    }
    pub mod infrastructure;
}

pub mod media {
    pub mod domain {
        pub mod audio_extractor;
        pub mod media_remuxer;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod apply_edits_use_case;
    pub mod engine_error;
    pub mod pipeline_logger;
    pub mod project_store;
    pub mod request_context;
    pub mod infrastructure;
}

pub mod shared {
    pub mod constants;
    pub mod engine_config;
}
