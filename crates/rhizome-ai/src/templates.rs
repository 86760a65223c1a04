//! The traversal templates used by the documentation engines

use crate::template::PromptTemplate;

/// Leaf nodes: no children, described from their own content alone.
pub const LEAF_NODE_ANALYSIS: PromptTemplate = PromptTemplate {
    name: "leaf_node_analysis",
    description: "Describes an individual code element from its own content",
    variables: &["node_name", "node_labels", "node_path", "node_content"],
    system_prompt: "\
You are a code analysis assistant. Write short, atomic descriptions of \
individual code elements.

For each element state its purpose, what it does, and its role. Keep the \
description factual and grounded in the code shown, two to four sentences.

Adjust to the element kind: for a function cover behaviour, inputs and \
outputs; for a class cover its main responsibility; for a file cover its \
overall purpose.

Do not describe relationships to other components or speculate beyond the \
content provided.",
    input_prompt: "\
Describe this code element:

Name: {node_name}
Kind: {node_labels}
Path: {node_path}

Content:
```
{node_content}
```

Write a concise description of its purpose and behaviour.",
};

/// Parents whose children all have descriptions available.
pub const PARENT_NODE_WITH_CONTEXT: PromptTemplate = PromptTemplate {
    name: "parent_node_with_context",
    description: "Describes a parent element using its children's descriptions",
    variables: &[
        "node_name",
        "node_labels",
        "node_path",
        "node_content",
        "child_descriptions",
    ],
    system_prompt: "\
You are a code analysis assistant. Write descriptions of composite code \
elements using the already-written descriptions of their children.

Synthesise what the element accomplishes as a whole rather than repeating \
each child description. Mention the key children by name where it helps. \
Keep the result factual and under a paragraph.",
    input_prompt: "\
Describe this code element using its children's descriptions:

Name: {node_name}
Kind: {node_labels}
Path: {node_path}

Child descriptions:
{child_descriptions}

Content:
```
{node_content}
```

Write a description of what this element accomplishes as a whole.",
};

/// Parents for which one or more child descriptions are unavailable
/// because of circular dependencies.
pub const PARENT_NODE_PARTIAL_CONTEXT: PromptTemplate = PromptTemplate {
    name: "parent_node_partial_context",
    description: "Describes a parent element with only partial child context",
    variables: &[
        "node_name",
        "node_labels",
        "node_path",
        "node_content",
        "child_descriptions",
        "fallback_note",
    ],
    system_prompt: "\
You are a code analysis assistant. Some child descriptions are unavailable \
because the codebase contains circular references; describe the element \
from the context that is available.

Extract as much as possible from the children you do have, stay accurate \
about what cannot be determined, and avoid dwelling on the gap.",
    input_prompt: "\
Describe this code element. Some child context is unavailable:

Name: {node_name}
Kind: {node_labels}
Path: {node_path}

Available child descriptions:
{child_descriptions}

Content:
```
{node_content}
```

{fallback_note}

Write the best description possible from the available context.",
};

/// Nodes with children that are all unavailable: described as an
/// enhanced leaf, from directly observable data only.
pub const ENHANCED_LEAF_FALLBACK: PromptTemplate = PromptTemplate {
    name: "enhanced_leaf_fallback",
    description: "Describes an element whose dependency context is unavailable",
    variables: &["node_name", "node_labels", "node_path", "node_content", "fallback_note"],
    system_prompt: "\
You are analysing a code element that calls or depends on other elements \
whose descriptions are unavailable because of circular references.

Describe only what is directly observable: the element's responsibility, \
its interface, and the behaviour visible in its own code. Do not speculate \
about the missing dependencies.",
    input_prompt: "\
Describe this code element from its own content:

Name: {node_name}
Kind: {node_labels}
Path: {node_path}

Content:
```
{node_content}
```

{fallback_note}

Write a description of its purpose and observable behaviour.",
};
