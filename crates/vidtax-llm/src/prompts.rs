//! Prompt templates for the three taxonomy roles.

use vidtax_core::{Record, TaxonomyNode};

/// Per-record extraction prompt. The transcript is cut to `transcript_max_chars` characters.
pub fn topic_prompt(record: &Record, transcript_max_chars: usize) -> String {
    let transcript: String = record.transcript.chars().take(transcript_max_chars).collect();
    format!(
        r#"
<instructions>
You are an expert agent specialized in extracting structured information from video data.
Your task is to analyze the video content and return a single, rich, valid JSON object.

The JSON object must contain the following keys:
- description: A summarized, detailed description of the video content (max 250 tokens).
- named_entities: An array of objects, each with 'name' and 'type', for all relevant entities (people, organizations, products).
- intention: The main purpose of the video (e.g., "Tutorial", "Product Review", "Entertainment").
- hierarchical_topics: An array of strings representing the main hierarchical topics. Generate up to 3 paths. Each path should go from a broad category to a specific subtopic, using ' > ' as a separator.

RULES:
1.  **Output Format:** You MUST return ONLY a single, valid JSON object. No other text or explanations.
2.  **Case:** All generated text (categories, topics, etc.) MUST be in lower case, EXCEPT for the 'name' value in 'named_entities'.
3.  **Topic Abstraction:** Hierarchical topics should be general and reusable categories, not specific events or details from a single video.
4.  **Consistency:** The paths in 'hierarchical_topics' should be logically consistent with each other.
</instructions>

<example_input>
Video Title: "How to Build a Gaming PC in 2024"
Video Description: "A full walkthrough of picking parts, assembling, and optimizing performance."
Video Transcript: "...we begin with choosing the right CPU for gaming and content creation..."
</example_input>

<example_output>
{{
  "description": "a comprehensive guide on building a gaming pc in 2024, covering part selection like cpus, assembly process, and performance optimization.",
  "named_entities": [
    {{"name": "Intel", "type": "brand"}},
    {{"name": "Nvidia", "type": "brand"}}
  ],
  "intention": "educational tutorial",
  "hierarchical_topics": [
    "technology > hardware > pc building",
    "gaming > equipment > custom builds"
  ]
}}
</example_output>

<video_data>
Video Title: {title}
Video Description: {description}
Video Transcript: {transcript}
</video_data>
"#,
        title = record.title,
        description = record.description,
    )
}

/// Pass 1: reduce the draft top-level names to at most `max_categories`.
pub fn top_level_prompt(categories: &[String], max_categories: usize) -> String {
    let list = serde_json::to_string(categories).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are an information architect. I have a list of top-level categories from a video taxonomy. \
         Your task is to consolidate and refine this list into a final, canonical set of no more than {max_categories} main categories.\n\n\
         Merge semantically similar categories. For example, 'celebrity' could be merged into 'entertainment'.\n\n\
         Return ONLY a JSON array with the final list of category names.\n\n\
         Here is the list of categories to refine:\n---\n{list}\n---"
    )
}

/// Pass 2: reorganize one category's subtree under the no-invent / no-drop rules.
pub fn subtree_prompt(category: &str, subtree: &TaxonomyNode) -> String {
    let body = serde_json::to_string_pretty(subtree).unwrap_or_else(|_| "null".to_string());
    format!(
        "You are a precise information architect. Your task is to refine the structure of the following JSON sub-tree \
         for the category '{category}'.\n\n\
         You must follow these rules strictly:\n\
         1.  **DO NOT INVENT NEW TOPICS:** You must only use the topics already present in the input JSON. \
         Do not add generic categories like 'Platforms' or 'Genres' unless they are already present.\n\
         2.  **ALLOWED ACTIONS:** Your only allowed actions are to **merge** semantically similar nodes and **re-parent** \
         nodes to a more logical location *within the provided sub-tree*.\n\
         3.  **PRESERVE LEAF NODES:** The final output must contain the same set of specific, leaf-node topics \
         (e.g., 'love is blind', 'garry's mod') as the input, just better organized.\n\
         4.  **FORMAT:** Return ONLY the refined JSON object. Leaf topics have the value null.\n\n\
         Here is an example of the task:\n\n\
         <example_input_subtree>\n\
         {{\n  \"esports\": {{ \"apex legends\": null }},\n  \"gameplay\": {{ \"first-person shooters\": null }},\n  \"gaming content\": {{ \"live streaming\": null }}\n}}\n\
         </example_input_subtree>\n\n\
         <example_output_subtree>\n\
         {{\n  \"esports\": {{ \"apex legends\": null }},\n  \"gameplay\": {{ \"first-person shooters\": null, \"live streaming\": null }}\n}}\n\
         </example_output_subtree>\n\n\
         Now, refine the following sub-tree according to these rules:\n---\n{body}\n---"
    )
}
