//! Static HTML pages served by the node.

/// File browser. Lists `/api/list` and links each entry through `/api/info`.
pub(crate) const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>File Node</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
        h1 { color: #333; }
        .node { color: #888; font-size: 0.9em; }
        ul { list-style: none; padding: 0; }
        li { margin: 10px 0; }
        a { color: #0066cc; text-decoration: none; }
        a:hover { text-decoration: underline; }
        code { color: #555; font-size: 0.8em; margin-left: 1em; }
    </style>
</head>
<body>
    <h1>Files</h1>
    <p class="node" id="node"></p>
    <ul id="fileList"></ul>
    <script>
        function encodePath(path) {
            return path.split('/').map(encodeURIComponent).join('/');
        }

        async function loadFiles() {
            const response = await fetch('/api/list');
            const { files, node } = await response.json();
            document.getElementById('node').textContent = 'node ' + node;
            const list = document.getElementById('fileList');

            for (const file of files) {
                const li = document.createElement('li');
                const a = document.createElement('a');
                a.textContent = file;
                a.href = '/' + encodePath(file);
                li.appendChild(a);
                list.appendChild(li);

                fetch('/api/info/' + encodePath(file))
                    .then(r => r.json())
                    .then(info => {
                        if (!info.downloadUrl) return;
                        a.href = info.downloadUrl;
                        const hash = document.createElement('code');
                        hash.textContent = info.hash.slice(0, 12);
                        li.appendChild(hash);
                    });
            }
        }
        loadFiles();
    </script>
</body>
</html>
"#;

/// API usage guide.
pub(crate) const DOCS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>File Node API</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
        code, pre { background: #f4f4f4; padding: 2px 4px; }
    </style>
</head>
<body>
    <h1>File download API</h1>

    <h2>1. List files</h2>
    <p><code>GET /api/list</code></p>
    <pre>{"code": 200, "files": ["a.txt", "dir/b.bin"], "node": "...", "msg": "success"}</pre>

    <h2>2. File information</h2>
    <p><code>GET /api/info/{path}</code></p>
    <pre>{"code": 200, "filename": "dir/b.bin", "hash": "&lt;sha256 hex&gt;", "downloadUrl": "...", "node": "...", "msg": "success"}</pre>

    <h2>3. Download a file</h2>
    <p><code>GET /{path}</code></p>

    <h2>4. Trigger a sync</h2>
    <p><code>POST /api/sync</code>. Answers 429 inside the cooldown window and 409 while a run is in progress.</p>

    <h2>5. Sync status</h2>
    <p><code>GET /api/status</code></p>

    <p>Errors are reported as <code>{"code": &lt;status&gt;, "error": "&lt;message&gt;"}</code>.</p>
</body>
</html>
"#;
