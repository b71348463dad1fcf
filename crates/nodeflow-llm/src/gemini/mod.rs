mod client;

pub use client::{
    function_response_payload, GeminiClient, GeminiContent, GeminiDialect, GeminiFunctionCall,
    GeminiFunctionResponse, GeminiPart, GeminiStreamParser, GEMINI_API_BASE, MALFORMED_FUNCTION_CALL,
};
