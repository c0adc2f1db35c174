use serde_json::{json, Value};

/// Built-in configuration that `config.yml` is merged over.
pub fn default_config() -> Value {
    json!({
        "answer_mapping": {
            "yes": "A",
            "no": "B",
            "maybe": "C"
        },
        "prompt": {
            "instruction": "You are a helpful medical expert. Answer the question using the options provided. Think step by step, then reply with a JSON object of the form {\"step_by_step_thinking\": \"...\", \"answer_choice\": \"X\"}.",
            "rationale_marker": "step_by_step_thinking",
            "answer_marker": "answer_choice"
        },
        "retrieval": {
            "mode": "similarity",
            "k": 8,
            "num_shots": 3,
            "seed": 42
        },
        "rag": {
            "chunk_size": 500,
            "chunk_overlap": 50,
            "max_chunks": 20,
            "top_k": 3,
            "max_context_length": 4000,
            "include_citations": true,
            "similarity_threshold": 0.1
        },
        "decoding": {
            "num_beams": 1,
            "do_sample": false,
            "max_length": 512,
            "min_length": null,
            "concept_bias": []
        },
        "generator": {
            "base_url": "http://localhost:1234/v1",
            "model": "qwen/qwen3-8b",
            "embedding_model": null,
            "api_key": null,
            "timeout_secs": 120,
            "max_concurrency": 1
        },
        "splits": {
            "train": { "start": 0, "end": 450 },
            "test": { "start": 450, "end": 500 }
        }
    })
}
